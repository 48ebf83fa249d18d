use agenthost_models::PairKey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Pair already stored: pair_id={pair_id} name={name}")]
    Conflict { pair_id: i64, name: String },
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Pair not found: {key}")]
    NotFound { key: PairKey },

    #[error("Pair persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("No pair id left after {max}")]
    IdSpaceExhausted { max: i64 },

    #[error("Invalid pair name: {0:?}")]
    InvalidName(String),

    #[error("Registry not available: {0}")]
    Unavailable(String),
}
