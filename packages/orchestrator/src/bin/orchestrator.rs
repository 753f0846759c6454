// Orchestrator entry point: reads configuration, distributes the
// credential pool, and drives the run cycle.

use anyhow::{Context, Result};
use clap::Parser;
use orchestrator_core::controller::RunCycleController;
use orchestrator_core::distributor::AccountPool;
use orchestrator_core::storage::PgStorage;
use orchestrator_core::supervisor::ProcessSupervisor;
use orchestrator_core::{Config, ConfigFile, RunMode};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "orchestrator", about = "Scraping-fleet orchestrator")]
struct Cli {
    /// Number of update workers (clamped to the credential pool)
    #[arg(long)]
    update: Option<usize>,

    /// Number of new-ingestion workers
    #[arg(long)]
    new: Option<usize>,

    /// JSON config file with credentials and settings
    #[arg(long, default_value = "scraper_config.json")]
    config_file: PathBuf,

    /// Which roles to run this session
    #[arg(long)]
    mode: Option<RunMode>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orchestrator_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let file = if cli.config_file.exists() {
        ConfigFile::load(&cli.config_file)?
    } else {
        tracing::warn!(path = %cli.config_file.display(), "config file not found, using environment only");
        ConfigFile::default()
    };
    let mode = cli.mode.or(file.mode).unwrap_or_default();
    let manual_update = cli.update.or(file.update_account_count);
    let manual_new = cli.new.or(file.new_account_count);
    let config = Config::resolve(file)?;

    tracing::info!("Connecting to document store");
    let storage = Arc::new(PgStorage::connect(&config.database_url).await?);
    storage.migrate().await?;
    tracing::info!("Migrations complete");

    let worker_binary = std::env::current_exe()
        .context("cannot locate own executable")?
        .with_file_name("scrape_worker");
    let supervisor = ProcessSupervisor::new(storage, worker_binary, config.worker_env());

    let pool = AccountPool::new(config.accounts.clone());
    let mut controller =
        RunCycleController::new(supervisor, pool, mode, manual_update, manual_new);
    controller.run().await
}
