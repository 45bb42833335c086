use crate::config::Config;
use crate::orchestrator::AnalysisMode;
use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::info;

pub mod commands;
pub mod migrate;

#[derive(Parser)]
#[command(
    name = "tradesage",
    about = "Trading hypothesis analysis: evidence, alerts and confidence scoring",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a trading hypothesis and store the result
    Analyze {
        /// Free-form hypothesis, e.g. "AAPL will reach $220 by Q2 2025"
        #[arg(long)]
        hypothesis: String,

        /// `analyze` runs every stage, `refine` only restates the hypothesis
        #[arg(short, long, default_value = "analyze")]
        mode: AnalysisMode,
    },

    /// Run database migrations
    Migrate,

    /// Display stored hypotheses and alert counts
    Dashboard {
        /// Number of recent hypotheses to show
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },

    /// List stored alerts
    Alerts {
        /// Only show unread alerts
        #[arg(short, long)]
        unread: bool,

        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Mark an alert as read
    MarkRead {
        #[arg(long)]
        alert_id: i64,
    },

    /// Check database, pgvector and Ollama connectivity
    Health,
}

/// Execute CLI command with database pool
pub async fn run(cli: Cli, config: Config, pool: PgPool) -> Result<()> {
    match cli.command {
        Commands::Analyze { hypothesis, mode } => {
            info!(?mode, "Running hypothesis analysis");
            commands::analyze(pool, config, hypothesis, mode).await?;
        }
        Commands::Migrate => {
            migrate::execute(pool).await?;
        }
        Commands::Dashboard { limit } => {
            commands::dashboard(pool, limit).await?;
        }
        Commands::Alerts { unread, limit } => {
            commands::alerts(pool, unread, limit).await?;
        }
        Commands::MarkRead { alert_id } => {
            info!(alert_id, "Marking alert as read");
            commands::mark_read(pool, alert_id).await?;
        }
        Commands::Health => {
            commands::health(pool, config).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_with_mode() {
        let cli = Cli::try_parse_from([
            "tradesage",
            "analyze",
            "--hypothesis",
            "Bitcoin will hit 100k",
            "--mode",
            "refine",
        ])
        .unwrap();

        match cli.command {
            Commands::Analyze { hypothesis, mode } => {
                assert_eq!(hypothesis, "Bitcoin will hit 100k");
                assert_eq!(mode, AnalysisMode::Refine);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_parse_alerts_and_mark_read() {
        let cli = Cli::try_parse_from(["tradesage", "alerts", "--unread"]).unwrap();
        assert!(matches!(cli.command, Commands::Alerts { unread: true, limit: 20 }));

        let cli = Cli::try_parse_from(["tradesage", "-v", "mark-read", "--alert-id", "42"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::MarkRead { alert_id: 42 }));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["tradesage", "analyze", "--hypothesis", "x", "--mode", "backtest"]).is_err());
    }
}
