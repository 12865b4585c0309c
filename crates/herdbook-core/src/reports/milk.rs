use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use super::render::{optional, Tabular};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilkReportRow {
    pub cow_id: Uuid,
    pub cow_name: String,
    pub total_milk_volume: f64,
    pub measurement_count: usize,
    /// Mean daily volume over the earlier days of the range.
    pub baseline_daily_volume: Option<f64>,
    /// Whether the last producing day falls short of the baseline.
    pub anomalous: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilkReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub rows: Vec<MilkReportRow>,
}

impl MilkReport {
    pub fn row(&self, cow_id: Uuid) -> Option<&MilkReportRow> {
        self.rows.iter().find(|row| row.cow_id == cow_id)
    }
}

impl Tabular for MilkReportRow {
    fn headers() -> &'static [&'static str] {
        &[
            "cow_id",
            "cow_name",
            "total_milk_volume",
            "measurement_count",
            "baseline_daily_volume",
            "anomalous",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.cow_id.to_string(),
            self.cow_name.clone(),
            format!("{:.2}", self.total_milk_volume),
            self.measurement_count.to_string(),
            optional(self.baseline_daily_volume),
            self.anomalous.to_string(),
        ]
    }
}

/// One cow's milk on one day. Days without readings are omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMilkRow {
    pub cow_id: Uuid,
    pub day: NaiveDate,
    pub milk_volume: f64,
    pub measurement_count: usize,
}

impl Tabular for DailyMilkRow {
    fn headers() -> &'static [&'static str] {
        &["cow_id", "day", "milk_volume", "measurement_count"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.cow_id.to_string(),
            self.day.to_string(),
            format!("{:.2}", self.milk_volume),
            self.measurement_count.to_string(),
        ]
    }
}
