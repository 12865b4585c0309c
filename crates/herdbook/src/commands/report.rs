// crates/herdbook/src/commands/report.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use herdbook_core::config::ReportConfig;
use herdbook_core::reports::{
    milk_file_name, render, weights_file_name, ReportEngine, ReportFormat, Tabular,
};
use herdbook_core::store::PostgresStore;
use tracing::info;

use crate::connect_pool;

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// Latest known weight of every cow as of a date
    Weights {
        /// Report date (YYYY-MM-DD); readings up to the end of this day count
        #[arg(long)]
        date: NaiveDate,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Milk totals per cow over an inclusive date range
    Milk {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// One row per cow and day instead of per cow
        #[arg(long)]
        daily: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
pub struct OutputArgs {
    /// table, csv or json
    #[arg(long, default_value = "table", value_parser = parse_format)]
    format: ReportFormat,
    /// Also save the report as CSV in this directory
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

fn parse_format(raw: &str) -> Result<ReportFormat, String> {
    ReportFormat::try_from(raw)
}

pub async fn handle_report(command: ReportCommand, config: ReportConfig) -> Result<()> {
    let pool = connect_pool(4).await?;
    let store = PostgresStore::new(pool);
    let engine = ReportEngine::new(&store, config)?;

    match command {
        ReportCommand::Weights { date, output } => {
            let report = engine.weights(date).await?;
            emit(&report.rows, &output, &weights_file_name(date))
        }
        ReportCommand::Milk {
            start,
            end,
            daily,
            output,
        } => {
            let file_name = milk_file_name(start, end);
            if daily {
                let rows = engine.milk_daily(start, end).await?;
                emit(&rows, &output, &file_name.replace(".csv", "_daily.csv"))
            } else {
                let report = engine.milk(start, end).await?;
                emit(&report.rows, &output, &file_name)
            }
        }
    }
}

fn emit<R: Tabular>(rows: &[R], output: &OutputArgs, file_name: &str) -> Result<()> {
    println!("{}", render(rows, output.format)?);
    if let Some(dir) = &output.out_dir {
        save_csv(rows, dir, file_name)?;
    }
    Ok(())
}

fn save_csv<R: Tabular>(rows: &[R], dir: &Path, file_name: &str) -> Result<()> {
    let path = dir.join(file_name);
    let csv = render(rows, ReportFormat::Csv)?;
    std::fs::write(&path, csv)
        .with_context(|| format!("failed to write report to {}", path.display()))?;
    info!(path = %path.display(), rows = rows.len(), "Saved report");
    Ok(())
}
