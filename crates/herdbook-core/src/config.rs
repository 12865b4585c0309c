// crates/herdbook-core/src/config.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reports::{Direction, TrailingMeanDeviation};

/// Knobs for one bulk load. Passed to [`crate::ingestion::IngestPipeline::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub dry_run: bool,
    pub concurrency_limit: usize,
    pub data_source: Option<PathBuf>,
    pub max_attempts: u32,
    /// Base delay between retries; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
    /// Log progress every N measurement rows. `None` means 1% of the dataset.
    pub progress_every: Option<usize>,
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency_limit: 50,
            data_source: None,
            max_attempts: 3,
            retry_backoff_ms: 500,
            progress_every: None,
            chunk_size: 10_000,
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency_limit == 0 {
            return Err(ConfigError::Invalid(
                "concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be at least 1".to_string()));
        }
        if self.progress_every == Some(0) {
            return Err(ConfigError::Invalid(
                "progress_every must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn progress_interval(&self, total_rows: usize) -> usize {
        self.progress_every.unwrap_or(total_rows / 100).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportConfig {
    pub baseline_days: i64,
    pub threshold_pct: f64,
    pub direction: Direction,
    pub stale_after_days: i64,
    /// Rows fetched per store round trip during report scans.
    pub page_size: usize,
}

/// Ten years; longer trailing windows are rejected.
pub const MAX_BASELINE_DAYS: i64 = 3_650;

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            baseline_days: 30,
            threshold_pct: 5.0,
            direction: Direction::Drop,
            stale_after_days: 3,
            page_size: 5_000,
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BASELINE_DAYS).contains(&self.baseline_days) {
            return Err(ConfigError::Invalid(format!(
                "baseline_days must be between 1 and {MAX_BASELINE_DAYS}"
            )));
        }
        if !self.threshold_pct.is_finite() || self.threshold_pct < 0.0 {
            return Err(ConfigError::Invalid(
                "threshold_pct must be a non-negative number".to_string(),
            ));
        }
        if self.stale_after_days < 0 {
            return Err(ConfigError::Invalid(
                "stale_after_days must not be negative".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn anomaly_rule(&self) -> TrailingMeanDeviation {
        TrailingMeanDeviation {
            baseline_days: self.baseline_days,
            threshold_pct: self.threshold_pct,
            direction: self.direction,
        }
    }
}

/// Contents of an optional `herdbook.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub ingest: IngestConfig,
    pub reports: ReportConfig,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(raw)?;
        settings.ingest.validate()?;
        settings.reports.validate()?;
        Ok(settings)
    }
}
