use agenthost_models::{Instrument, Position};

use crate::error::BrokerError;

/// Synchronous order surface an agent trades through.
///
/// Each agent gets its own handle; `positions` only reports positions held
/// by that agent. Implementations serialize their own position book.
pub trait Broker: Send + Sync {
    fn buy(&self, instrument: &Instrument, units: u64) -> Result<Position, BrokerError>;

    fn sell(&self, instrument: &Instrument, units: u64) -> Result<Position, BrokerError>;

    fn positions(&self) -> Result<Vec<Position>, BrokerError>;

    fn close(&self, position: &Position) -> Result<(), BrokerError>;
}
