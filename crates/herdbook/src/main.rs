// crates/herdbook/src/main.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use herdbook_core::config::Settings;
use herdbook_core::db;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
use commands::load::{handle_load, LoadArgs};
use commands::report::{handle_report, ReportCommand};

/// Bulk loader and reports for herd sensor measurements
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with [ingest] and [reports] sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load cows, sensors and measurements from a dataset directory
    Load(LoadArgs),
    /// Build a weight or milk report
    Report {
        #[command(subcommand)]
        report: ReportCommand,
    },
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Load(args) => handle_load(args, settings.ingest).await,
        Command::Report { report } => handle_report(report, settings.reports).await,
        Command::Migrate => {
            let pool = connect_pool(2).await?;
            db::run_migrations(&pool).await?;
            info!("Database migrations applied");
            Ok(())
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(Settings::default()),
    }
}

pub(crate) async fn connect_pool(max_connections: u32) -> Result<db::DbPool> {
    let database_url = db::database_url_from_env()?;
    db::connect(&database_url, max_connections).await
}
