use agenthost_registry::RegistryError;
use thiserror::Error;
use uuid::Uuid;

use crate::runtime::Lifecycle;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("No quote available for {0}")]
    NoQuote(String),

    #[error("Unknown position: {0}")]
    UnknownPosition(Uuid),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{operation} called before post_create")]
    NotCreated { operation: &'static str },

    #[error("post_create called twice (agent is {state})")]
    AlreadyCreated { state: Lifecycle },

    #[error("{operation} called on a suspended agent")]
    Suspended { operation: &'static str },

    #[error("{operation} requires a suspended agent (agent is {state})")]
    NotSuspended {
        operation: &'static str,
        state: Lifecycle,
    },

    #[error("{operation} called on a terminated agent")]
    Terminated { operation: &'static str },
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown agent type: {0}")]
    UnknownType(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid state snapshot: {0}")]
    InvalidState(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
