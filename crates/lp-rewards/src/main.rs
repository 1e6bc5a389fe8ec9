mod cli;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cli::{inspect::InspectCommands, rewards::RewardsCommands};
use lp_rewards::{
    calculator::orchestrator::Orchestrator, ingestor::snapshot::SnapshotSource, settings::Settings,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "lp-rewards",
    about = "Off-chain incentive allocation for liquidity providers",
    version,
    author,
    after_help = r#"Configuration:
    Configuration can be provided via:
    1. Environment variables with LP__ prefix (e.g., LP__ALLOCATION__BUDGET)
    2. .env file in the current directory
    3. Config file with -c option (see example.config.toml)

Examples:
    # Allocate one week of rewards without persisting state
    lp-rewards calculate --start 2024-03-01T00:00:00Z --end 2024-03-08T00:00:00Z --dry-run

    # Run a single block range
    lp-rewards run-period --start-block 1000 --end-block 2000

    # Show the value curve of a pool
    lp-rewards inspect value-curve --pool <ADDRESS> --start-block 1000 --end-block 2000"#
)]
pub struct Cli {
    /// Path to the configuration file (TOML format)
    ///
    /// If not provided, will attempt to load from environment variables
    #[clap(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Rewards(RewardsCommands),
    /// Inspect value curves, loyalty stacks and source data
    Inspect {
        #[command(subcommand)]
        cmd: InspectCommands,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = if let Some(config_path) = &self.config {
            Settings::from_path(config_path)?
        } else {
            Settings::from_env()?
        };
        init_logging(&settings.log_level)?;

        if let Some(metrics) = &settings.metrics {
            PrometheusBuilder::new()
                .with_http_listener(metrics.addr)
                .install()?;
            info!("Metrics exporter listening on {}", metrics.addr);
        }
        export_build_info();

        let source = Arc::new(
            SnapshotSource::load(&settings.fetch.snapshot_dir).with_context(|| {
                format!(
                    "Failed to load ledger snapshot from {:?}",
                    settings.fetch.snapshot_dir
                )
            })?,
        );
        let orchestrator = Orchestrator::new(source.clone(), source, &settings);

        match self.command {
            Commands::Rewards(cmd) => cli::rewards::handle(&orchestrator, cmd).await,
            Commands::Inspect { cmd } => cli::inspect::handle(&orchestrator, cmd).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}

fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

fn export_build_info() {
    let version = option_env!("BUILD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    let build_commit = option_env!("BUILD_COMMIT").unwrap_or("UNKNOWN");

    metrics::gauge!(
        "lp_rewards_build_info",
        "version" => version,
        "commit" => build_commit,
    )
    .set(1);
}
