/// Instrument table. Both the numeric id and the name are unique.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS pairs (
///     pair_id  INTEGER NOT NULL,
///     name     TEXT NOT NULL
/// );
/// CREATE UNIQUE INDEX IF NOT EXISTS pairs_pair_id_index ON pairs(pair_id);
/// CREATE UNIQUE INDEX IF NOT EXISTS pairs_name_index ON pairs(name);
/// ```
pub const PAIRS_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS pairs (
    pair_id  INTEGER NOT NULL,
    name     TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS pairs_pair_id_index ON pairs(pair_id);
CREATE UNIQUE INDEX IF NOT EXISTS pairs_name_index ON pairs(name);
";

/// Persisted agent state, one JSON snapshot per agent id.
pub const AGENT_STATES_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS agent_states (
    agent_id    TEXT PRIMARY KEY,
    state_json  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";
