//! Doubles for exercising agents without a real broker or store.
//!
//! `RecordingBroker` keeps a plain position list and logs every call so
//! tests can assert on order flow. `RecordingObserver` collects points and
//! contained errors.

use std::sync::{Arc, Mutex};

use agenthost_models::{Instrument, Position, Side, Tick};
use agenthost_registry::{InstrumentRegistry, SqlitePairStore};
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::observer::{Observer, SeriesPoint};
use crate::policy::{Confidence, DecisionPolicy, Features};
use crate::runtime::AgentContext;

/// Returns the same confidence for every input and remembers what it saw.
pub struct FixedPolicy {
    confidence: Mutex<Confidence>,
    seen: Mutex<Vec<Features>>,
}

impl FixedPolicy {
    pub fn new(buy: f64, sell: f64) -> Self {
        Self {
            confidence: Mutex::new(Confidence { buy, sell }),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn set(&self, buy: f64, sell: f64) {
        *self.confidence.lock().unwrap() = Confidence { buy, sell };
    }

    pub fn seen(&self) -> Vec<Features> {
        self.seen.lock().unwrap().clone()
    }

    pub fn clear_seen(&self) {
        self.seen.lock().unwrap().clear();
    }
}

impl DecisionPolicy for FixedPolicy {
    fn evaluate(&self, features: &Features) -> Confidence {
        self.seen.lock().unwrap().push(*features);
        *self.confidence.lock().unwrap()
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    points: Mutex<Vec<SeriesPoint>>,
    errors: Mutex<Vec<(String, BrokerError)>>,
}

impl RecordingObserver {
    pub fn points(&self) -> Vec<SeriesPoint> {
        self.points.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(String, BrokerError)> {
        self.errors.lock().unwrap().clone()
    }
}

impl Observer for RecordingObserver {
    fn record(&self, point: &SeriesPoint) {
        self.points.lock().unwrap().push(point.clone());
    }

    fn report_error(&self, agent_id: &str, error: &BrokerError) {
        self.errors
            .lock()
            .unwrap()
            .push((agent_id.to_string(), error.clone()));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerCall {
    Buy { pair: String, units: u64 },
    Sell { pair: String, units: u64 },
    Close { side: Side },
    CloseFailed { side: Side },
}

/// Fills every order at 0.0 unless told to fail.
#[derive(Default)]
pub struct RecordingBroker {
    calls: Mutex<Vec<BrokerCall>>,
    positions: Mutex<Vec<Position>>,
    failure: Mutex<Option<BrokerError>>,
    close_failure: Mutex<Option<BrokerError>>,
}

impl RecordingBroker {
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.positions.lock().unwrap().clone()
    }

    /// Make every following call fail with `error` (or succeed again with `None`).
    pub fn fail_with(&self, error: Option<BrokerError>) {
        *self.failure.lock().unwrap() = error;
    }

    /// Make only the next `close` fail with `error`.
    pub fn fail_next_close(&self, error: BrokerError) {
        *self.close_failure.lock().unwrap() = Some(error);
    }

    fn check(&self) -> Result<(), BrokerError> {
        match self.failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn open(
        &self,
        instrument: &Instrument,
        side: Side,
        units: u64,
    ) -> Result<Position, BrokerError> {
        self.check()?;
        let pair = instrument.name.clone();
        self.calls.lock().unwrap().push(match side {
            Side::Buy => BrokerCall::Buy {
                pair: pair.clone(),
                units,
            },
            Side::Sell => BrokerCall::Sell {
                pair: pair.clone(),
                units,
            },
        });
        let position = Position {
            id: Uuid::new_v4(),
            owner: "test".to_string(),
            pair,
            side,
            units,
            entry_price: 0.0,
            opened_at: Utc::now(),
        };
        self.positions.lock().unwrap().push(position.clone());
        Ok(position)
    }
}

impl Broker for RecordingBroker {
    fn buy(&self, instrument: &Instrument, units: u64) -> Result<Position, BrokerError> {
        self.open(instrument, Side::Buy, units)
    }

    fn sell(&self, instrument: &Instrument, units: u64) -> Result<Position, BrokerError> {
        self.open(instrument, Side::Sell, units)
    }

    fn positions(&self) -> Result<Vec<Position>, BrokerError> {
        self.check()?;
        Ok(self.open_positions())
    }

    fn close(&self, position: &Position) -> Result<(), BrokerError> {
        self.check()?;
        if let Some(e) = self.close_failure.lock().unwrap().take() {
            self.calls.lock().unwrap().push(BrokerCall::CloseFailed {
                side: position.side,
            });
            return Err(e);
        }
        let mut positions = self.positions.lock().unwrap();
        let idx = positions
            .iter()
            .position(|p| p.id == position.id)
            .ok_or(BrokerError::UnknownPosition(position.id))?;
        let closed = positions.remove(idx);
        self.calls
            .lock()
            .unwrap()
            .push(BrokerCall::Close { side: closed.side });
        Ok(())
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// A tick with a fixed 0.02 spread.
pub fn tick_at(pair: &str, bid: f64, secs: i64) -> Tick {
    Tick::new(pair, bid, bid + 0.02, at(secs))
}

pub fn memory_registry() -> Arc<InstrumentRegistry> {
    let store = SqlitePairStore::open_in_memory().unwrap();
    Arc::new(InstrumentRegistry::load(store).unwrap())
}

pub fn context(
    agent_id: &str,
    broker: Arc<dyn Broker>,
    observer: Arc<dyn Observer>,
) -> AgentContext {
    AgentContext {
        agent_id: agent_id.to_string(),
        broker,
        observer,
        registry: memory_registry(),
    }
}
