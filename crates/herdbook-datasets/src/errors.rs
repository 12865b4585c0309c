use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Dataset-level failures. Any of these aborts a load: the input as a whole
/// cannot be trusted.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("data directory {} does not exist", path.display())]
    MissingDirectory { path: PathBuf },

    #[error("dataset '{dataset}' not found in {}: expected {dataset}.parquet or {dataset}.csv", dir.display())]
    MissingDataset { dataset: &'static str, dir: PathBuf },

    #[error("dataset '{dataset}' is missing required column '{column}'")]
    MissingColumn {
        dataset: &'static str,
        column: &'static str,
    },

    #[error("dataset '{dataset}' column '{column}' has unsupported type {dtype}")]
    UnsupportedType {
        dataset: &'static str,
        column: &'static str,
        dtype: String,
    },

    #[error("dataset '{dataset}' could not be read: {source}")]
    Polars {
        dataset: &'static str,
        #[source]
        source: PolarsError,
    },
}

impl DatasetError {
    pub(crate) fn polars(dataset: &'static str) -> impl FnOnce(PolarsError) -> Self {
        move |source| DatasetError::Polars { dataset, source }
    }
}

/// A single malformed row. Local to that row: the loader skips it and moves on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("{dataset} row {row}: column '{column}' is empty")]
    Missing {
        dataset: &'static str,
        row: usize,
        column: &'static str,
    },

    #[error("{dataset} row {row}: column '{column}' value '{value}' is invalid: {reason}")]
    Invalid {
        dataset: &'static str,
        row: usize,
        column: &'static str,
        value: String,
        reason: String,
    },
}

impl RowError {
    pub fn row(&self) -> usize {
        match self {
            RowError::Missing { row, .. } | RowError::Invalid { row, .. } => *row,
        }
    }
}
