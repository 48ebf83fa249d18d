use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use agenthost::agents::AgentFactory;
use agenthost::models::PairKey;

#[derive(Parser, Debug)]
#[command(name = "agenthost", about = "Automated FX trading agent host")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/agenthost.toml")]
    config: String,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect or extend the instrument registry
    Pairs {
        #[command(subcommand)]
        command: PairsCommand,
    },
    /// List the available agent types and their properties
    Agents,
    /// Run the configured agents over a JSON-lines tick file (or stdin)
    Run {
        #[arg(short, long)]
        ticks: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PairsCommand {
    /// List every registered instrument
    List,
    /// Look up an instrument, registering it first if it is new
    Register { name: String },
    /// Look up an instrument by id or name
    Get {
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        id: Option<i64>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Re-read the pairs table and list the result
    Reload,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Agents => {
            let factory = AgentFactory::default();
            let descriptors: Vec<_> = factory.descriptors().collect();
            print_json(&descriptors, cli.pretty)?;
        }
        Command::Pairs { command } => {
            let config = agenthost::load_config(&cli.config)?;
            let registry = agenthost::open_registry(&config)?;
            match command {
                PairsCommand::List => print_json(&registry.all()?, cli.pretty)?,
                PairsCommand::Register { name } => {
                    let instrument = registry
                        .create_or_get(&name)
                        .with_context(|| format!("Failed to register {name}"))?;
                    print_json(&instrument, cli.pretty)?;
                }
                PairsCommand::Get { id, name } => {
                    let key = match (id, name) {
                        (Some(id), _) => PairKey::Id(id),
                        (None, Some(name)) => PairKey::Name(name),
                        (None, None) => anyhow::bail!("either --id or --name is required"),
                    };
                    let instrument = match &key {
                        PairKey::Id(id) => registry.get_by_id(*id),
                        PairKey::Name(name) => registry.get_by_name(name),
                    }
                    .with_context(|| format!("No instrument with {key}"))?;
                    print_json(&instrument, cli.pretty)?;
                }
                PairsCommand::Reload => {
                    registry.reload()?;
                    print_json(&registry.all()?, cli.pretty)?;
                }
            }
        }
        Command::Run { ticks } => {
            let config = agenthost::load_config(&cli.config)?;
            let host = agenthost::build_host(&config)?;
            host.run_until_interrupted(ticks.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("Host error: {e}"))?;
        }
    }

    Ok(())
}
