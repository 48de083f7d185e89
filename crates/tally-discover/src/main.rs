//! CLI entry point for the tally-discover batch jobs.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use tally_core::AgentId;
use tally_store::{InventoryStore, JsonFileStore};

use tally_discover::config::DiscoverConfig;
use tally_discover::pass::{DiscoveryPass, PassOutcome};
use tally_discover::query::SnmpWalkClient;
use tally_discover::resolve::{self, HickoryResolver, ResolveTarget};

#[derive(Parser)]
#[command(name = "tally-discover")]
#[command(about = "Address discovery and DNS reconciliation for the Tally inventory")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: tally).
    #[arg(short, long, default_value = "tally", global = true)]
    config: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Discover active hosts from device ARP tables and update the inventory.
    Discover {
        /// Agent identity to scan for (defaults to the configured agent).
        #[arg(long)]
        agent: Option<u64>,
    },
    /// Reverse-resolve addresses and write hostnames back.
    Resolve {
        /// Agent identity whose subnets are resolved.
        #[arg(long)]
        agent: Option<u64>,

        /// Resolve every address instead of the agent's subnets.
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let config = load_discover_config(&cli.config)?;
    let store: Arc<dyn InventoryStore> = Arc::new(JsonFileStore::open(&config.inventory_path).await?);

    match cli.command {
        Command::Discover { agent } => {
            let agent = agent.map(AgentId).unwrap_or(config.agent_id);
            let client = Arc::new(SnmpWalkClient::new(
                &config.snmpwalk_path,
                config.query_timeout_secs,
            ));
            let send_summary = config.send_mail_on_change;
            let pass = DiscoveryPass::new(config, store, client);

            match pass.run(agent).await {
                Ok(PassOutcome::Disabled) => {
                    println!("Scanning disabled (check_method = none)");
                }
                Ok(PassOutcome::NothingToScan) => {
                    println!("No subnets are marked for new hosts checking");
                }
                Ok(PassOutcome::Completed(report)) => {
                    for failure in &report.failures {
                        eprintln!("Subnet {} not scanned: {}", failure.cidr, failure.error);
                    }
                    let summary = report.change_summary();
                    if send_summary && !summary.is_empty() {
                        print!("{}", summary.render());
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Discovery pass aborted");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Resolve { agent, all } => {
            let target = if all {
                ResolveTarget::Global
            } else {
                ResolveTarget::Agent(agent.map(AgentId).unwrap_or(config.agent_id))
            };
            let resolver = HickoryResolver::new(&config.nameservers)?;

            match resolve::run_resolve_pass(
                store.as_ref(),
                &resolver,
                target,
                config.resolve_empty_only,
            )
            .await
            {
                Ok(report) => {
                    if config.resolve_verbose && !report.updated.is_empty() {
                        println!("{}", report.render());
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "DNS pass aborted");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("TALLY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}
