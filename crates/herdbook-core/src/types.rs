// crates/herdbook-core/src/types.rs

use std::fmt;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a sensor measures. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SensorKind {
    Weight,
    MilkYield,
    Temperature,
    Other(String),
}

impl SensorKind {
    pub fn as_str(&self) -> &str {
        match self {
            SensorKind::Weight => "weight",
            SensorKind::MilkYield => "milk_yield",
            SensorKind::Temperature => "temperature",
            SensorKind::Other(kind) => kind.as_str(),
        }
    }

    /// Infers the kind from a unit label: `kg` is a scale, `L` a milk meter.
    pub fn from_unit(unit: &str) -> Self {
        match unit.trim() {
            "kg" | "KG" | "Kg" => SensorKind::Weight,
            "L" | "l" => SensorKind::MilkYield,
            "C" | "°C" | "degC" => SensorKind::Temperature,
            other => SensorKind::Other(other.to_ascii_lowercase()),
        }
    }

    /// Kinds whose readings must be strictly positive to be valid.
    pub fn requires_positive(&self) -> bool {
        matches!(self, SensorKind::Weight | SensorKind::MilkYield)
    }
}

impl From<&str> for SensorKind {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "weight" => SensorKind::Weight,
            "milk_yield" | "milk" => SensorKind::MilkYield,
            "temperature" | "temp" => SensorKind::Temperature,
            other => SensorKind::Other(other.to_string()),
        }
    }
}

impl From<String> for SensorKind {
    fn from(value: String) -> Self {
        SensorKind::from(value.as_str())
    }
}

impl From<SensorKind> for String {
    fn from(value: SensorKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCow {
    pub id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub birthdate: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cow {
    pub id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub birthdate: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSensor {
    pub id: Uuid,
    pub kind: SensorKind,
    pub unit: String,
    pub cow_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub id: Uuid,
    pub kind: SensorKind,
    pub unit: String,
    pub cow_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A reading as submitted. `unit` falls back to the sensor's unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub cow_id: Uuid,
    pub sensor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

/// A stored reading, joined with its sensor's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    pub cow_id: Uuid,
    pub sensor_id: Uuid,
    pub kind: SensorKind,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub unit: String,
    pub is_valid: bool,
    pub validation_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Measurement {
    /// The value if the reading is usable in reports.
    pub fn valid_value(&self) -> Option<f64> {
        if self.is_valid {
            self.value
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Upserted {
    Created,
    Existing,
}

/// Half-open `[start, end)` time window; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Everything up to and including the whole of `day` (UTC).
    pub fn through_day(day: NaiveDate) -> Self {
        Self {
            start: None,
            end: Some(start_of_day(next_day(day))),
        }
    }

    /// Whole days `first..=last` (UTC).
    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: Some(start_of_day(first)),
            end: Some(start_of_day(next_day(last))),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |start| ts >= start) && self.end.map_or(true, |end| ts < end)
    }
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

fn next_day(day: NaiveDate) -> NaiveDate {
    day.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)
}

pub const DEFAULT_PAGE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementQuery {
    pub cow_id: Option<Uuid>,
    pub sensor_id: Option<Uuid>,
    pub kind: Option<SensorKind>,
    pub range: Option<TimeRange>,
    /// Drop readings flagged invalid at write time.
    pub valid_only: bool,
    /// Keyset cursor: only readings strictly after `(timestamp, id)`.
    pub after: Option<(DateTime<Utc>, i64)>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for MeasurementQuery {
    fn default() -> Self {
        Self {
            cow_id: None,
            sensor_id: None,
            kind: None,
            range: None,
            valid_only: false,
            after: None,
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl MeasurementQuery {
    pub fn for_cow(cow_id: Uuid) -> Self {
        Self {
            cow_id: Some(cow_id),
            ..Self::default()
        }
    }

    pub fn for_sensor(sensor_id: Uuid) -> Self {
        Self {
            sensor_id: Some(sensor_id),
            ..Self::default()
        }
    }

    pub fn for_kind(kind: SensorKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn within(mut self, range: TimeRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn valid_only(mut self) -> Self {
        self.valid_only = true;
        self
    }

    /// Resumes after `last`, the final reading of the previous page.
    pub fn after(mut self, last: &Measurement) -> Self {
        self.after = Some((last.timestamp, last.id));
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Filter predicates only; paging is applied by the caller.
    pub fn matches(&self, measurement: &Measurement) -> bool {
        self.cow_id.map_or(true, |id| measurement.cow_id == id)
            && self.sensor_id.map_or(true, |id| measurement.sensor_id == id)
            && self.kind.as_ref().map_or(true, |kind| &measurement.kind == kind)
            && self
                .range
                .map_or(true, |range| range.contains(measurement.timestamp))
            && (!self.valid_only || measurement.is_valid)
            && self
                .after
                .map_or(true, |cursor| (measurement.timestamp, measurement.id) > cursor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub cows: usize,
    pub sensors: usize,
    pub measurements: usize,
}

impl StoreCounts {
    pub fn total(&self) -> usize {
        self.cows + self.sensors + self.measurements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn kind_inferred_from_unit() {
        assert_eq!(SensorKind::from_unit("kg"), SensorKind::Weight);
        assert_eq!(SensorKind::from_unit("L"), SensorKind::MilkYield);
        assert_eq!(SensorKind::from_unit("°C"), SensorKind::Temperature);
        assert_eq!(SensorKind::from_unit("bpm"), SensorKind::Other("bpm".into()));
    }

    #[test]
    fn kind_parses_aliases_and_round_trips_through_string() {
        assert_eq!(SensorKind::from("Milk-Yield"), SensorKind::MilkYield);
        assert_eq!(SensorKind::from("milk"), SensorKind::MilkYield);
        assert_eq!(String::from(SensorKind::Weight), "weight");
        let json = serde_json::to_string(&SensorKind::Temperature).unwrap();
        assert_eq!(json, "\"temperature\"");
    }

    #[test]
    fn day_ranges_are_inclusive_of_whole_days() {
        let first = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let last = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let range = TimeRange::days(first, last);

        assert!(range.contains(Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()));
        assert!(range.contains(Utc.with_ymd_and_hms(2024, 6, 15, 23, 59, 59).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 6, 16, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 6, 9, 23, 59, 59).unwrap()));
    }

    #[test]
    fn through_day_is_open_at_the_start() {
        let range = TimeRange::through_day(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert!(range.contains(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()));
        assert!(!range.contains(Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap()));
    }
}
