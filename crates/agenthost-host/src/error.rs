use agenthost_agents::{AgentError, LifecycleError};
use agenthost_registry::RegistryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Worker for agent {0} is gone")]
    WorkerGone(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State store unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
