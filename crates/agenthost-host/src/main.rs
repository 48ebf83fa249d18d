use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use agenthost_host::{Host, HostDeps};
use agenthost_models::AgenthostConfig;

#[derive(Parser, Debug)]
#[command(
    name = "agenthost-daemon",
    about = "Agent host daemon - feeds market ticks to the configured trading agents"
)]
struct Cli {
    /// Path to host configuration file
    #[arg(short, long, default_value = "config/agenthost.toml")]
    config: String,

    /// JSON-lines tick file; reads stdin when omitted
    #[arg(short, long)]
    ticks: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("Failed to read config: {}", cli.config))?;
    let config: AgenthostConfig =
        toml::from_str(&config_str).with_context(|| "Failed to parse host config")?;

    let deps = HostDeps::from_config(&config).with_context(|| "Failed to open databases")?;
    let host = Host::start(&config, deps).with_context(|| "Failed to start agents")?;

    host.run_until_interrupted(cli.ticks.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!("Host error: {e}"))?;

    Ok(())
}
