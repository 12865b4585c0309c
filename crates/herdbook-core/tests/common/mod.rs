#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use herdbook_core::store::{InMemoryStore, MeasurementStore};
use herdbook_core::types::{NewCow, NewMeasurement, NewSensor, SensorKind};
use uuid::Uuid;

pub fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

pub fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, hour, minute, 0).unwrap()
}

pub fn new_cow(name: &str) -> NewCow {
    NewCow {
        id: Uuid::new_v4(),
        name: name.to_string(),
        breed: Some("Holstein".to_string()),
        birthdate: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
    }
}

pub fn new_sensor(kind: SensorKind, unit: &str) -> NewSensor {
    NewSensor {
        id: Uuid::new_v4(),
        kind,
        unit: unit.to_string(),
        cow_id: None,
    }
}

pub fn reading(cow: &NewCow, sensor: &NewSensor, timestamp: DateTime<Utc>, value: f64) -> NewMeasurement {
    NewMeasurement {
        cow_id: cow.id,
        sensor_id: sensor.id,
        timestamp,
        value: Some(value),
        unit: None,
    }
}

/// A store with one scale, one milk meter and the given cows.
pub struct Barn {
    pub store: InMemoryStore,
    pub scale: NewSensor,
    pub meter: NewSensor,
}

impl Barn {
    pub async fn new() -> Self {
        let store = InMemoryStore::new();
        let scale = new_sensor(SensorKind::Weight, "kg");
        let meter = new_sensor(SensorKind::MilkYield, "L");
        store.upsert_sensor(&scale).await.unwrap();
        store.upsert_sensor(&meter).await.unwrap();
        Self { store, scale, meter }
    }

    pub async fn cow(&self, name: &str) -> NewCow {
        let cow = new_cow(name);
        self.store.upsert_cow(&cow).await.unwrap();
        cow
    }

    pub async fn weigh(&self, cow: &NewCow, timestamp: DateTime<Utc>, kg: f64) -> i64 {
        self.store
            .insert_measurement(&reading(cow, &self.scale, timestamp, kg))
            .await
            .unwrap()
            .id
    }

    pub async fn milk(&self, cow: &NewCow, timestamp: DateTime<Utc>, litres: f64) -> i64 {
        self.store
            .insert_measurement(&reading(cow, &self.meter, timestamp, litres))
            .await
            .unwrap()
            .id
    }
}
