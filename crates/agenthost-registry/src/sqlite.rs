use std::time::Duration;

use agenthost_models::schema::PAIRS_TABLE_DDL;
use agenthost_models::PairRecord;
use rusqlite::{Connection, ErrorCode};

use crate::error::StoreError;
use crate::store::PairStore;

/// SQLite-backed pair store.
///
/// File databases are opened in WAL mode with a busy timeout so that several
/// processes can share one pairs table.
pub struct SqlitePairStore {
    conn: Connection,
}

impl SqlitePairStore {
    const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open a read-write connection, creating the schema if needed.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(PAIRS_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Self::BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(PAIRS_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM pairs", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl PairStore for SqlitePairStore {
    fn read_all(&self) -> Result<Vec<PairRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT pair_id, name FROM pairs ORDER BY pair_id")?;

        let rows = stmt
            .query_map([], |row| {
                Ok(PairRecord {
                    pair_id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn insert_unique(&mut self, record: &PairRecord) -> Result<(), StoreError> {
        let result = self.conn.execute(
            "INSERT INTO pairs (pair_id, name) VALUES (?1, ?2)",
            rusqlite::params![record.pair_id, record.name],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict {
                    pair_id: record.pair_id,
                    name: record.name.clone(),
                })
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }
}
