//! agenthost - a host for automated FX trading agents
//!
//! Agents receive market ticks, keep their own indicators and trade through a
//! broker. Instrument identities are shared through a SQLite-backed registry.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use agenthost::models::{AgenthostConfig, Tick};
//! use agenthost::registry::{InstrumentRegistry, SqlitePairStore};
//! use agenthost::agents::{AgentFactory, NeuralNetAgent};
//! use agenthost::host::{Host, JsonLinesSource};
//! ```

pub use agenthost_agents as agents;
pub use agenthost_host as host;
pub use agenthost_models as models;
pub use agenthost_registry as registry;

use std::path::Path;

use agenthost_host::{Host, HostDeps};
use agenthost_models::AgenthostConfig;
use agenthost_registry::{InstrumentRegistry, SqlitePairStore};
use anyhow::Context;

/// Read and parse a TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<AgenthostConfig, anyhow::Error> {
    let path = path.as_ref();
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&config_str).with_context(|| "Failed to parse config")
}

/// Open the instrument registry named in `config`.
pub fn open_registry(config: &AgenthostConfig) -> Result<InstrumentRegistry, anyhow::Error> {
    let store = SqlitePairStore::open(&config.registry.sqlite_path).with_context(|| {
        format!("Failed to open pairs DB: {}", config.registry.sqlite_path)
    })?;
    Ok(InstrumentRegistry::load(store)?)
}

/// Open the databases in `config` and start every enabled agent.
/// Must be called from within a tokio runtime.
pub fn build_host(config: &AgenthostConfig) -> Result<Host, anyhow::Error> {
    let deps = HostDeps::from_config(config).context("Failed to open databases")?;
    Ok(Host::start(config, deps)?)
}
