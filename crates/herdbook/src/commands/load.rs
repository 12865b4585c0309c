// crates/herdbook/src/commands/load.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use herdbook_core::config::IngestConfig;
use herdbook_core::datasets::DatasetDirectory;
use herdbook_core::db;
use herdbook_core::ingestion::{DryRunSink, IngestInput, IngestPipeline, IngestSummary, StoreSink};
use herdbook_core::store::PostgresStore;
use tracing::{info, warn};

use crate::connect_pool;

#[derive(Args, Debug, Default)]
pub struct LoadArgs {
    /// Directory holding cows, sensors and measurements (.parquet or .csv)
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Transform and log every request without touching the database
    #[arg(long)]
    dry_run: bool,
    /// Maximum number of writes in flight
    #[arg(long)]
    concurrency: Option<usize>,
    /// Measurement rows read per chunk
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Write dry-run payloads to this file, one JSON object per line
    #[arg(long, requires = "dry_run")]
    payload_out: Option<PathBuf>,
    /// Skip running migrations before loading
    #[arg(long)]
    skip_migrations: bool,
}

impl LoadArgs {
    fn apply(&self, mut config: IngestConfig) -> IngestConfig {
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(limit) = self.concurrency {
            config.concurrency_limit = limit;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(dir) = &self.data_dir {
            config.data_source = Some(dir.clone());
        }
        config
    }
}

pub async fn handle_load(args: LoadArgs, config: IngestConfig) -> Result<()> {
    let config = args.apply(config);
    let data_dir = config
        .data_source
        .clone()
        .context("--data-dir (or ingest.data_source in the config file) is required")?;

    let directory = DatasetDirectory::open(&data_dir)?;
    let input = IngestInput::load(&directory, config.chunk_size)?;

    let summary = if config.dry_run {
        let sink = match &args.payload_out {
            Some(path) => DryRunSink::with_payload_log(path)?,
            None => DryRunSink::new(),
        };
        let summary = IngestPipeline::new(&sink, config)?.run(input).await?;
        let written = sink.finish()?;
        if let Some(path) = &args.payload_out {
            info!(path = %path.display(), payloads = written, "Wrote dry-run payloads");
        }
        summary
    } else {
        let max_connections = u32::try_from(config.concurrency_limit).unwrap_or(u32::MAX);
        let pool = connect_pool(max_connections).await?;
        if args.skip_migrations {
            warn!("Skipping migrations before loading");
        } else {
            db::run_migrations(&pool).await?;
        }
        let store = PostgresStore::new(pool);
        let sink = StoreSink::new(&store);
        IngestPipeline::new(&sink, config)?.run(input).await?
    };

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    if summary.dry_run {
        println!("Dry run: nothing was written.");
    }
    println!("{}", summary.render_table());
    if summary.failed() > 0 {
        println!(
            "{} records failed; rerun the same load to retry them.",
            summary.failed()
        );
    }
}
