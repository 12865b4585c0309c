//! The measurement store contract shared by the loader and the report engine.
//!
//! Implementations must uphold two invariants on every write: a measurement's
//! cow and sensor exist, and `(cow_id, sensor_id, timestamp)` is unique. A
//! duplicate triple is reported as [`StoreError::Conflict`], never overwritten.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{
    Cow, Measurement, MeasurementQuery, NewCow, NewMeasurement, NewSensor, Page, Sensor,
    StoreCounts, Upserted,
};

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Creates the cow unless one with the same id exists.
    async fn upsert_cow(&self, cow: &NewCow) -> Result<Upserted, StoreError>;

    /// Creates the sensor unless one with the same id exists.
    async fn upsert_sensor(&self, sensor: &NewSensor) -> Result<Upserted, StoreError>;

    /// Appends a reading. Fails with `Conflict` on a duplicate triple and with
    /// `Invalid` when the cow or sensor does not exist.
    async fn insert_measurement(
        &self,
        measurement: &NewMeasurement,
    ) -> Result<Measurement, StoreError>;

    /// One page of matching readings, ordered by timestamp then id.
    async fn query_measurements(
        &self,
        query: &MeasurementQuery,
    ) -> Result<Vec<Measurement>, StoreError>;

    /// Number of readings matching the query filters, ignoring paging.
    async fn count_measurements(&self, query: &MeasurementQuery) -> Result<usize, StoreError>;

    async fn get_cow(&self, id: Uuid) -> Result<Option<Cow>, StoreError>;

    /// Cows ordered by name, then id.
    async fn list_cows(&self, offset: usize, limit: usize) -> Result<Page<Cow>, StoreError>;

    async fn get_sensor(&self, id: Uuid) -> Result<Option<Sensor>, StoreError>;

    async fn list_sensors(&self, offset: usize, limit: usize) -> Result<Page<Sensor>, StoreError>;

    async fn get_measurement(&self, id: i64) -> Result<Option<Measurement>, StoreError>;

    /// The newest valid reading of each sensor kind for one cow.
    async fn latest_by_kind(&self, cow_id: Uuid) -> Result<Vec<Measurement>, StoreError>;

    /// Deletes a cow and its measurements. Returns whether the cow existed.
    async fn delete_cow(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Deletes a sensor and its measurements. Returns whether the sensor existed.
    async fn delete_sensor(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_measurement(&self, id: i64) -> Result<bool, StoreError>;

    async fn counts(&self) -> Result<StoreCounts, StoreError>;

    /// Removes every measurement, sensor and cow. Returns what was removed.
    async fn wipe_all(&self) -> Result<StoreCounts, StoreError>;
}
