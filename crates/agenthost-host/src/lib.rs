pub mod error;
pub mod host;
pub mod source;
pub mod state_store;

pub use error::HostError;
pub use host::{Host, HostDeps};
pub use source::{ChannelSource, JsonLinesSource, TickSource};
pub use state_store::SqliteStateStore;
