use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::anomaly::{window_start, SeriesPoint};
use super::render::{optional, Tabular};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    Active,
    /// The latest reading is older than the configured freshness window.
    Stale,
}

impl DataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataStatus::Active => "active",
            DataStatus::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightReportRow {
    pub cow_id: Uuid,
    pub weight_value: f64,
    pub measurement_timestamp: DateTime<Utc>,
    pub baseline_mean: Option<f64>,
    pub deviation_pct: Option<f64>,
    pub status: DataStatus,
    pub anomalous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightReport {
    pub as_of: NaiveDate,
    pub rows: Vec<WeightReportRow>,
}

impl WeightReport {
    pub fn row(&self, cow_id: Uuid) -> Option<&WeightReportRow> {
        self.rows.iter().find(|row| row.cow_id == cow_id)
    }
}

impl Tabular for WeightReportRow {
    fn headers() -> &'static [&'static str] {
        &[
            "cow_id",
            "weight_value",
            "measurement_timestamp",
            "baseline_mean",
            "deviation_pct",
            "status",
            "anomalous",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.cow_id.to_string(),
            format!("{:.2}", self.weight_value),
            self.measurement_timestamp.to_rfc3339(),
            optional(self.baseline_mean),
            optional(self.deviation_pct),
            self.status.as_str().to_string(),
            self.anomalous.to_string(),
        ]
    }
}

/// Per-cow weight history trimmed to the newest point plus whatever falls
/// within `lookback` of it. Points must be pushed oldest first.
#[derive(Debug, Default)]
pub(crate) struct TrailingSeries {
    by_cow: BTreeMap<Uuid, VecDeque<SeriesPoint>>,
}

impl TrailingSeries {
    pub fn push(&mut self, cow_id: Uuid, point: SeriesPoint, lookback: chrono::Duration) {
        let series = self.by_cow.entry(cow_id).or_default();
        series.push_back(point);
        let window_start = window_start(point.timestamp, lookback);
        while series
            .front()
            .is_some_and(|oldest| oldest.timestamp < window_start)
        {
            series.pop_front();
        }
    }

    pub fn into_series(self) -> impl Iterator<Item = (Uuid, Vec<SeriesPoint>)> {
        self.by_cow
            .into_iter()
            .map(|(cow_id, points)| (cow_id, Vec::from(points)))
    }
}
