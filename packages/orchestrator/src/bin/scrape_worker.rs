// One worker process: binds a single credential for its lifetime and
// runs the batch loop for its role. Spawned by the orchestrator with
// settings passed through the environment.

use anyhow::{Context, Result};
use clap::Parser;
use extraction::HtmlExtractor;
use orchestrator_core::models::{Credential, WorkerRole};
use orchestrator_core::storage::PgStorage;
use orchestrator_core::worker::{ReqwestClient, ScraperSession, Worker};
use orchestrator_core::{BatchSettings, Config, ConfigFile};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "scrape_worker", about = "Single scraping worker")]
struct Cli {
    /// Worker role: update or new
    role: WorkerRole,

    /// Credential identifier
    credential_id: String,

    /// Credential secret
    secret: String,

    /// Worker slot assigned by the orchestrator
    slot: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Output goes to the supervisor's pty; plain lines, no ANSI
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orchestrator_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_ansi(false))
        .init();

    let cli = Cli::parse();
    tracing::info!(role = %cli.role, slot = cli.slot, "worker process starting");

    let config = Config::resolve(ConfigFile::default())
        .context("worker environment is incomplete")?;
    let storage = Arc::new(
        PgStorage::connect(&config.database_url)
            .await
            .context("worker cannot reach the document store")?,
    );

    let client = ReqwestClient::new(&config.proxies)?;
    let credential = Credential::new(cli.credential_id, cli.secret);
    let session = ScraperSession::new(client, credential, config.login_url.clone());

    let settings = match cli.role {
        WorkerRole::New => {
            BatchSettings::resolve(WorkerRole::New, config.batch_size_new, config.max_batches_new)
        }
        WorkerRole::Update => BatchSettings::resolve(
            WorkerRole::Update,
            config.batch_size_update,
            config.max_batches_update,
        ),
    };

    let worker = Worker::new(storage, session, HtmlExtractor::new(), settings);
    worker.run(cli.role).await?;
    tracing::info!(slot = cli.slot, "worker process done");
    Ok(())
}
