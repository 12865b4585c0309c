use std::fmt;

use herdbook_datasets::{CowRow, MeasurementRow, SensorRow};
use serde::{Deserialize, Serialize};

use crate::types::{NewCow, NewMeasurement, NewSensor, SensorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Cows,
    Sensors,
    Measurements,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dataset::Cows => "cows",
            Dataset::Sensors => "sensors",
            Dataset::Measurements => "measurements",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One store mutation derived from an input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteRequest {
    UpsertCow(NewCow),
    UpsertSensor(NewSensor),
    InsertMeasurement(NewMeasurement),
}

impl WriteRequest {
    pub fn dataset(&self) -> Dataset {
        match self {
            WriteRequest::UpsertCow(_) => Dataset::Cows,
            WriteRequest::UpsertSensor(_) => Dataset::Sensors,
            WriteRequest::InsertMeasurement(_) => Dataset::Measurements,
        }
    }

    /// The JSON body of this request. Dry runs record exactly this string.
    pub fn payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<CowRow> for WriteRequest {
    fn from(row: CowRow) -> Self {
        WriteRequest::UpsertCow(NewCow {
            id: row.id,
            name: row.name,
            breed: row.breed,
            birthdate: row.birthdate,
        })
    }
}

impl From<SensorRow> for WriteRequest {
    fn from(row: SensorRow) -> Self {
        let kind = match row.kind.as_deref() {
            Some(kind) => SensorKind::from(kind),
            None => SensorKind::from_unit(&row.unit),
        };
        WriteRequest::UpsertSensor(NewSensor {
            id: row.id,
            kind,
            unit: row.unit,
            cow_id: row.cow_id,
        })
    }
}

impl From<MeasurementRow> for WriteRequest {
    fn from(row: MeasurementRow) -> Self {
        WriteRequest::InsertMeasurement(NewMeasurement {
            cow_id: row.cow_id,
            sensor_id: row.sensor_id,
            timestamp: row.timestamp,
            value: row.value,
            unit: row.unit,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn sensor_kind_falls_back_to_unit() {
        let request = WriteRequest::from(SensorRow {
            id: Uuid::nil(),
            unit: "L".into(),
            kind: None,
            cow_id: None,
        });
        match request {
            WriteRequest::UpsertSensor(sensor) => assert_eq!(sensor.kind, SensorKind::MilkYield),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn payload_is_tagged_with_op() {
        let request = WriteRequest::from(CowRow {
            id: Uuid::nil(),
            name: "Daisy".into(),
            breed: Some("Jersey".into()),
            birthdate: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
        });
        let payload: serde_json::Value = serde_json::from_str(&request.payload().unwrap()).unwrap();
        assert_eq!(payload["op"], "upsert_cow");
        assert_eq!(payload["name"], "Daisy");
        assert_eq!(payload["birthdate"], "2021-03-04");
    }

    #[test]
    fn measurement_payload_round_trips() {
        let request = WriteRequest::from(MeasurementRow {
            cow_id: Uuid::new_v4(),
            sensor_id: Uuid::new_v4(),
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            value: None,
            unit: None,
        });
        assert_eq!(request.dataset(), Dataset::Measurements);
        let decoded: WriteRequest = serde_json::from_str(&request.payload().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }
}
