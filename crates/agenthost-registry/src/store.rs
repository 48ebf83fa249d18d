use agenthost_models::PairRecord;

use crate::error::StoreError;

/// Durable storage behind the instrument registry.
///
/// Implementations must enforce uniqueness of both `pair_id` and `name`,
/// rejecting a duplicate with `StoreError::Conflict`.
pub trait PairStore: Send {
    fn read_all(&self) -> Result<Vec<PairRecord>, StoreError>;

    fn insert_unique(&mut self, record: &PairRecord) -> Result<(), StoreError>;
}
