use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::property::PropertyValue;

/// Top-level configuration for the agent host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgenthostConfig {
    pub registry: SqliteConfig,
    pub state: SqliteConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    pub sqlite_path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/agenthost.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Capacity of each agent's command queue.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Settings for the built-in paper broker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerConfig {
    /// Slippage in basis points applied to every fill.
    #[serde(default)]
    pub slippage_bps: f64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { slippage_bps: 0.0 }
    }
}

/// One configured agent instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Unique id; also the key its persisted state is stored under.
    pub id: String,
    /// Factory type name, e.g. "neural_net".
    #[serde(rename = "type")]
    pub agent_type: String,
    /// Instrument whose ticks this agent receives.
    pub pair: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides for the agent type's declared properties.
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

fn default_channel_capacity() -> usize {
    1024
}
fn default_true() -> bool {
    true
}
