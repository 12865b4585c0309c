use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RowError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CowRow {
    pub id: Uuid,
    pub name: String,
    pub breed: Option<String>,
    pub birthdate: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRow {
    pub id: Uuid,
    pub unit: String,
    /// Explicit sensor kind; when absent the kind is inferred from the unit.
    pub kind: Option<String>,
    pub cow_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRow {
    pub cow_id: Uuid,
    pub sensor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    pub unit: Option<String>,
}

/// One input row, either decoded or rejected. `index` is the zero-based
/// position of the row in its dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow<T> {
    pub index: usize,
    pub record: Result<T, RowError>,
}

impl<T> ParsedRow<T> {
    pub fn ok(index: usize, record: T) -> Self {
        Self {
            index,
            record: Ok(record),
        }
    }

    pub fn rejected(index: usize, error: RowError) -> Self {
        Self {
            index,
            record: Err(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParsedRow<U> {
        ParsedRow {
            index: self.index,
            record: self.record.map(f),
        }
    }
}
