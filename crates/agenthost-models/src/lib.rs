pub mod config;
pub mod instrument;
pub mod property;
pub mod schema;
pub mod tick;

pub use config::{AgentConfig, AgenthostConfig, BrokerConfig, HostConfig, SqliteConfig};
pub use instrument::{Instrument, PairKey, PairRecord};
pub use property::{PropertyInfo, PropertyValue};
pub use tick::{Position, Side, Tick};
