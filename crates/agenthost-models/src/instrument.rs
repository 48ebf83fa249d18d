use std::fmt;

use serde::{Deserialize, Serialize};

/// A tradable instrument ("pair") with its registry-assigned identity.
///
/// Instruments are only ever created by the instrument registry and are never
/// mutated afterwards, so they are handed out by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Instrument {
    pub id: i64,
    pub name: String,
}

impl Instrument {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl From<PairRecord> for Instrument {
    fn from(record: PairRecord) -> Self {
        Self {
            id: record.pair_id,
            name: record.name,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// A raw row of the `pairs` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairRecord {
    pub pair_id: i64,
    pub name: String,
}

impl From<&Instrument> for PairRecord {
    fn from(instrument: &Instrument) -> Self {
        Self {
            pair_id: instrument.id,
            name: instrument.name.clone(),
        }
    }
}

/// The key a registry lookup was made with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PairKey {
    Id(i64),
    Name(String),
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairKey::Id(id) => write!(f, "id={id}"),
            PairKey::Name(name) => write!(f, "name={name}"),
        }
    }
}
