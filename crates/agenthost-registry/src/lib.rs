pub mod error;
pub mod registry;
pub mod sqlite;
pub mod store;

pub use error::{RegistryError, StoreError};
pub use registry::{normalize_name, InstrumentRegistry};
pub use sqlite::SqlitePairStore;
pub use store::PairStore;
