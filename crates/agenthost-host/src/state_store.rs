use std::time::Duration;

use agenthost_models::schema::AGENT_STATES_TABLE_DDL;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::error::HostError;

/// Persisted agent state keyed by agent id.
///
/// Opens the database in WAL mode so it can share a file with the pairs
/// table. Each save replaces the previous snapshot for that agent.
pub struct SqliteStateStore {
    conn: Connection,
}

impl SqliteStateStore {
    /// Open a read-write connection to the state database.
    /// Creates the schema if it doesn't exist.
    pub fn open(path: &str) -> Result<Self, HostError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(AGENT_STATES_TABLE_DDL)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self, HostError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(AGENT_STATES_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn save(&self, agent_id: &str, state: &Value) -> Result<(), HostError> {
        let state_json = serde_json::to_string(state)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO agent_states (agent_id, state_json, updated_at) \
             VALUES (?1, ?2, ?3)",
            rusqlite::params![agent_id, state_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Last saved snapshot for `agent_id`, if any.
    pub fn load(&self, agent_id: &str) -> Result<Option<Value>, HostError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT state_json FROM agent_states WHERE agent_id = ?1",
                rusqlite::params![agent_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(HostError::from))
            .transpose()
    }

    pub fn count(&self) -> Result<usize, HostError> {
        let count: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM agent_states", [], |row| row.get(0))?;
        Ok(count)
    }
}
