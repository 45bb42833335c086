use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradesage::cli::{self, Cli, Commands};
use tradesage::config::Config;
use tradesage::db;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first
    let config = Config::load()?;

    // Structured JSON logging; --verbose raises the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "tradesage starting up");

    let db = db::Database::new(&config.database).await?;
    db.health_check().await?;

    // The migrate command runs migrations itself
    if !matches!(cli.command, Commands::Migrate) {
        db.run_migrations().await?;
        if let Err(e) = db.check_pgvector().await {
            warn!(error = %e, "Could not check pgvector, knowledge-base search may be unavailable");
        }
    }

    info!("Database initialized successfully");

    cli::run(cli, config, db.pool).await?;

    info!("tradesage completed successfully");
    Ok(())
}
