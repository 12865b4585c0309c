mod columns;
pub(crate) mod schema;

use std::fmt;
use std::path::Path;

use polars::prelude::*;

pub(crate) use columns::{Frame, NumberColumn, TextColumn, TimestampColumn};

/// On-disk encodings a dataset may use. Parquet wins when both are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetFormat {
    Parquet,
    Csv,
}

impl DatasetFormat {
    pub const ALL: [DatasetFormat; 2] = [DatasetFormat::Parquet, DatasetFormat::Csv];

    pub fn extension(&self) -> &'static str {
        match self {
            DatasetFormat::Parquet => "parquet",
            DatasetFormat::Csv => "csv",
        }
    }

    /// CSV columns are all read as text and decoded per row by `Frame`, so a
    /// late fractional or malformed cell is a row error, not a scan failure.
    pub(crate) fn scan(&self, path: &Path) -> PolarsResult<LazyFrame> {
        match self {
            DatasetFormat::Parquet => LazyFrame::scan_parquet(path, ScanArgsParquet::default()),
            DatasetFormat::Csv => LazyCsvReader::new(path)
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .finish(),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl TryFrom<&str> for DatasetFormat {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parquet" | "pq" => Ok(DatasetFormat::Parquet),
            "csv" => Ok(DatasetFormat::Csv),
            other => Err(format!("unknown dataset format '{other}'")),
        }
    }
}
