use std::fmt;

use chrono::NaiveDate;
use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use crate::error::ReportError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Table,
    Csv,
    Json,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Table => "table",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ReportFormat {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(ReportFormat::Table),
            "csv" => Ok(ReportFormat::Csv),
            "json" => Ok(ReportFormat::Json),
            other => Err(format!("unknown report format '{other}'")),
        }
    }
}

/// A report row that can be laid out as columns.
pub trait Tabular: Serialize {
    fn headers() -> &'static [&'static str];
    fn cells(&self) -> Vec<String>;
}

pub fn render<R: Tabular>(rows: &[R], format: ReportFormat) -> Result<String, ReportError> {
    match format {
        ReportFormat::Table => Ok(render_table(rows)),
        ReportFormat::Csv => render_csv(rows),
        ReportFormat::Json => serde_json::to_string_pretty(rows)
            .map_err(|err| ReportError::Render(err.to_string())),
    }
}

fn render_table<R: Tabular>(rows: &[R]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(R::headers().to_vec());
    for row in rows {
        table.add_row(row.cells());
    }
    table.to_string()
}

fn render_csv<R: Tabular>(rows: &[R]) -> Result<String, ReportError> {
    let render_err = |err: csv::Error| ReportError::Render(err.to_string());
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(R::headers()).map_err(render_err)?;
    for row in rows {
        writer.write_record(row.cells()).map_err(render_err)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ReportError::Render(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ReportError::Render(err.to_string()))
}

pub fn weights_file_name(as_of: NaiveDate) -> String {
    format!("report_weights_{}.csv", as_of.format("%Y%m%d"))
}

pub fn milk_file_name(start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "report_milk_{}_{}.csv",
        start.format("%Y%m%d"),
        end.format("%Y%m%d")
    )
}

pub(crate) fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}
