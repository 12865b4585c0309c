// crates/herdbook-core/src/error.rs

use std::path::PathBuf;

use chrono::NaiveDate;
use herdbook_datasets::DatasetError;
use thiserror::Error;

/// How the loader should react to a failed store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The record already exists; treated as an idempotent success.
    Conflict,
    /// The store refused this record; skip it and continue.
    Invalid,
    /// Timeout or dropped connection; worth retrying.
    Transient,
    /// Nothing further can succeed; abort the run.
    Fatal,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid write: {0}")]
    Invalid(String),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store rejected credentials: {0}")]
    Unauthorized(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A non-store destination (such as a payload log) could not accept the write.
    #[error("write sink failed: {0}")]
    Sink(String),
}

impl StoreError {
    pub fn class(&self) -> FailureClass {
        match self {
            StoreError::Conflict(_) => FailureClass::Conflict,
            StoreError::Invalid(_) => FailureClass::Invalid,
            StoreError::Transient(_) => FailureClass::Transient,
            StoreError::Unauthorized(_) | StoreError::Database(_) | StoreError::Sink(_) => {
                FailureClass::Fatal
            }
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let code = db.code().map(|code| code.into_owned()).unwrap_or_default();
            let message = db.message().to_string();
            // SQLSTATE classes: 22 data exception, 28 invalid authorization,
            // 08 connection exception, 40 transaction rollback, 57P0x shutdown.
            let classified = match code.as_str() {
                "23505" => Some(StoreError::Conflict(message)),
                "23502" | "23503" | "23514" => Some(StoreError::Invalid(message)),
                c if c.starts_with("22") => Some(StoreError::Invalid(message)),
                c if c.starts_with("28") => Some(StoreError::Unauthorized(message)),
                c if c.starts_with("08") || c.starts_with("40") || c.starts_with("57P0") => {
                    Some(StoreError::Transient(message))
                }
                _ => None,
            };
            if let Some(classified) = classified {
                return classified;
            }
        }

        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Tls(_) => {
                StoreError::Transient(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("load aborted by store failure: {0}")]
    Store(#[source] StoreError),

    #[error("invalid ingest configuration: {0}")]
    Config(String),

    #[error("failed to write payload log {}: {source}", path.display())]
    PayloadLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("start date {start} is after end date {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("failed to render report: {0}")]
    Render(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
