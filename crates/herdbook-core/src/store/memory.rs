use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::MeasurementStore;
use crate::error::StoreError;
use crate::types::{
    Cow, Measurement, MeasurementQuery, NewCow, NewMeasurement, NewSensor, Page, Sensor,
    StoreCounts, Upserted,
};
use crate::validation::assess_value;

type ReadingKey = (Uuid, Uuid, DateTime<Utc>);
type SeriesKey = (Uuid, DateTime<Utc>, i64);
type TimeKey = (DateTime<Utc>, i64);

/// In-process store with the same indexing as the Postgres schema: readings by
/// `(cow_id, timestamp)`, by `(sensor_id, timestamp)` and by timestamp alone.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    cows: BTreeMap<Uuid, Cow>,
    sensors: BTreeMap<Uuid, Sensor>,
    measurements: BTreeMap<i64, Measurement>,
    by_cow: BTreeSet<SeriesKey>,
    by_sensor: BTreeSet<SeriesKey>,
    by_time: BTreeSet<TimeKey>,
    readings: HashMap<ReadingKey, i64>,
    last_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tables {
    fn index(&mut self, m: &Measurement) {
        self.by_cow.insert((m.cow_id, m.timestamp, m.id));
        self.by_sensor.insert((m.sensor_id, m.timestamp, m.id));
        self.by_time.insert((m.timestamp, m.id));
        self.readings.insert((m.cow_id, m.sensor_id, m.timestamp), m.id);
    }

    fn remove_measurement(&mut self, id: i64) -> Option<Measurement> {
        let m = self.measurements.remove(&id)?;
        self.by_cow.remove(&(m.cow_id, m.timestamp, m.id));
        self.by_sensor.remove(&(m.sensor_id, m.timestamp, m.id));
        self.by_time.remove(&(m.timestamp, m.id));
        self.readings.remove(&(m.cow_id, m.sensor_id, m.timestamp));
        Some(m)
    }

    /// Ids of candidate readings in `(timestamp, id)` order, using the
    /// narrowest index the query allows. Remaining predicates are applied by
    /// the caller.
    fn candidates<'a>(&'a self, query: &MeasurementQuery) -> Box<dyn Iterator<Item = i64> + 'a> {
        let range = query.range.unwrap_or_default();
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start >= end {
                return Box::new(std::iter::empty());
            }
        }
        if let (Some((after_ts, _)), Some(end)) = (query.after, range.end) {
            if after_ts >= end {
                return Box::new(std::iter::empty());
            }
        }

        // The keyset cursor replaces the range start when it is further along.
        let lower: Bound<TimeKey> = match query.after {
            Some(cursor) if range.start.map_or(true, |start| cursor.0 >= start) => {
                Bound::Excluded(cursor)
            }
            _ => Bound::Included((range.start.unwrap_or(DateTime::<Utc>::MIN_UTC), i64::MIN)),
        };

        let series = |index: &'a BTreeSet<SeriesKey>, key: Uuid| {
            let lower = match lower {
                Bound::Excluded((ts, id)) => Bound::Excluded((key, ts, id)),
                Bound::Included((ts, id)) => Bound::Included((key, ts, id)),
                Bound::Unbounded => Bound::Unbounded,
            };
            let upper = match range.end {
                Some(end) => Bound::Excluded((key, end, i64::MIN)),
                None => Bound::Included((key, DateTime::<Utc>::MAX_UTC, i64::MAX)),
            };
            index.range((lower, upper)).map(|(_, _, id)| *id)
        };

        if let Some(cow_id) = query.cow_id {
            return Box::new(series(&self.by_cow, cow_id));
        }
        if let Some(sensor_id) = query.sensor_id {
            return Box::new(series(&self.by_sensor, sensor_id));
        }

        let upper = match range.end {
            Some(end) => Bound::Excluded((end, i64::MIN)),
            None => Bound::Unbounded,
        };
        Box::new(self.by_time.range((lower, upper)).map(|(_, id)| *id))
    }

    fn matching<'a>(&'a self, query: &'a MeasurementQuery) -> impl Iterator<Item = &'a Measurement> {
        self.candidates(query)
            .filter_map(|id| self.measurements.get(&id))
            .filter(|m| query.matches(m))
    }
}

fn page_of<T>(items: impl ExactSizeIterator<Item = T>, offset: usize, limit: usize) -> Page<T> {
    let total = items.len();
    Page {
        items: items.skip(offset).take(limit).collect(),
        total,
    }
}

#[async_trait]
impl MeasurementStore for InMemoryStore {
    async fn upsert_cow(&self, cow: &NewCow) -> Result<Upserted, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.cows.contains_key(&cow.id) {
            return Ok(Upserted::Existing);
        }
        tables.cows.insert(
            cow.id,
            Cow {
                id: cow.id,
                name: cow.name.clone(),
                breed: cow.breed.clone(),
                birthdate: cow.birthdate,
                created_at: Utc::now(),
            },
        );
        Ok(Upserted::Created)
    }

    async fn upsert_sensor(&self, sensor: &NewSensor) -> Result<Upserted, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.sensors.contains_key(&sensor.id) {
            return Ok(Upserted::Existing);
        }
        if let Some(cow_id) = sensor.cow_id {
            if !tables.cows.contains_key(&cow_id) {
                return Err(StoreError::Invalid(format!(
                    "sensor {} references unknown cow {cow_id}",
                    sensor.id
                )));
            }
        }
        tables.sensors.insert(
            sensor.id,
            Sensor {
                id: sensor.id,
                kind: sensor.kind.clone(),
                unit: sensor.unit.clone(),
                cow_id: sensor.cow_id,
                created_at: Utc::now(),
            },
        );
        Ok(Upserted::Created)
    }

    async fn insert_measurement(
        &self,
        new: &NewMeasurement,
    ) -> Result<Measurement, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(sensor) = tables.sensors.get(&new.sensor_id) else {
            return Err(StoreError::Invalid(format!(
                "sensor {} does not exist",
                new.sensor_id
            )));
        };
        if !tables.cows.contains_key(&new.cow_id) {
            return Err(StoreError::Invalid(format!(
                "cow {} does not exist",
                new.cow_id
            )));
        }
        if tables
            .readings
            .contains_key(&(new.cow_id, new.sensor_id, new.timestamp))
        {
            return Err(StoreError::Conflict(format!(
                "measurement for cow {} sensor {} at {} already exists",
                new.cow_id, new.sensor_id, new.timestamp
            )));
        }

        let assessment = assess_value(&sensor.kind, new.value);
        let measurement = Measurement {
            id: tables.last_id + 1,
            cow_id: new.cow_id,
            sensor_id: new.sensor_id,
            kind: sensor.kind.clone(),
            timestamp: new.timestamp,
            value: new.value,
            unit: new.unit.clone().unwrap_or_else(|| sensor.unit.clone()),
            is_valid: assessment.is_valid,
            validation_error: assessment.validation_error,
            created_at: Utc::now(),
        };

        tables.last_id = measurement.id;
        tables.index(&measurement);
        tables.measurements.insert(measurement.id, measurement.clone());
        Ok(measurement)
    }

    async fn query_measurements(
        &self,
        query: &MeasurementQuery,
    ) -> Result<Vec<Measurement>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .matching(query)
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn count_measurements(&self, query: &MeasurementQuery) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.matching(query).count())
    }

    async fn get_cow(&self, id: Uuid) -> Result<Option<Cow>, StoreError> {
        Ok(self.tables.read().await.cows.get(&id).cloned())
    }

    async fn list_cows(&self, offset: usize, limit: usize) -> Result<Page<Cow>, StoreError> {
        let tables = self.tables.read().await;
        let mut cows: Vec<&Cow> = tables.cows.values().collect();
        cows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(page_of(cows.into_iter().cloned(), offset, limit))
    }

    async fn get_sensor(&self, id: Uuid) -> Result<Option<Sensor>, StoreError> {
        Ok(self.tables.read().await.sensors.get(&id).cloned())
    }

    async fn list_sensors(&self, offset: usize, limit: usize) -> Result<Page<Sensor>, StoreError> {
        let tables = self.tables.read().await;
        Ok(page_of(tables.sensors.values().cloned(), offset, limit))
    }

    async fn get_measurement(&self, id: i64) -> Result<Option<Measurement>, StoreError> {
        Ok(self.tables.read().await.measurements.get(&id).cloned())
    }

    async fn latest_by_kind(&self, cow_id: Uuid) -> Result<Vec<Measurement>, StoreError> {
        let tables = self.tables.read().await;
        let query = MeasurementQuery::for_cow(cow_id).valid_only();
        let mut latest: BTreeMap<_, &Measurement> = BTreeMap::new();
        // Candidates arrive in (timestamp, id) order, so the last one wins.
        for m in tables.matching(&query) {
            latest.insert(m.kind.clone(), m);
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn delete_cow(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.cows.remove(&id).is_none() {
            return Ok(false);
        }
        let ids: Vec<i64> = tables
            .by_cow
            .range((id, DateTime::<Utc>::MIN_UTC, i64::MIN)..=(id, DateTime::<Utc>::MAX_UTC, i64::MAX))
            .map(|(_, _, mid)| *mid)
            .collect();
        for mid in ids {
            tables.remove_measurement(mid);
        }
        for sensor in tables.sensors.values_mut() {
            if sensor.cow_id == Some(id) {
                sensor.cow_id = None;
            }
        }
        Ok(true)
    }

    async fn delete_sensor(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.sensors.remove(&id).is_none() {
            return Ok(false);
        }
        let ids: Vec<i64> = tables
            .by_sensor
            .range((id, DateTime::<Utc>::MIN_UTC, i64::MIN)..=(id, DateTime::<Utc>::MAX_UTC, i64::MAX))
            .map(|(_, _, mid)| *mid)
            .collect();
        for mid in ids {
            tables.remove_measurement(mid);
        }
        Ok(true)
    }

    async fn delete_measurement(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.remove_measurement(id).is_some())
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let tables = self.tables.read().await;
        Ok(StoreCounts {
            cows: tables.cows.len(),
            sensors: tables.sensors.len(),
            measurements: tables.measurements.len(),
        })
    }

    async fn wipe_all(&self) -> Result<StoreCounts, StoreError> {
        let mut tables = self.tables.write().await;
        let removed = StoreCounts {
            cows: tables.cows.len(),
            sensors: tables.sensors.len(),
            measurements: tables.measurements.len(),
        };
        // Ids keep increasing across wipes, like a sequence.
        let last_id = tables.last_id;
        *tables = Tables {
            last_id,
            ..Tables::default()
        };
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::types::{SensorKind, TimeRange};

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    async fn seeded() -> (InMemoryStore, Uuid, Uuid, Uuid) {
        let store = InMemoryStore::new();
        let (cow, scale, meter) = seed(&store).await;
        (store, cow, scale, meter)
    }

    async fn seed(store: &InMemoryStore) -> (Uuid, Uuid, Uuid) {
        let cow = Uuid::new_v4();
        let scale = Uuid::new_v4();
        let meter = Uuid::new_v4();
        store
            .upsert_cow(&NewCow {
                id: cow,
                name: "Bessie".into(),
                breed: None,
                birthdate: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            })
            .await
            .unwrap();
        for (id, kind, unit) in [(scale, SensorKind::Weight, "kg"), (meter, SensorKind::MilkYield, "L")] {
            store
                .upsert_sensor(&NewSensor {
                    id,
                    kind,
                    unit: unit.into(),
                    cow_id: None,
                })
                .await
                .unwrap();
        }
        (cow, scale, meter)
    }

    async fn insert(store: &InMemoryStore, cow: Uuid, sensor: Uuid, at: DateTime<Utc>, value: f64) -> i64 {
        store
            .insert_measurement(&NewMeasurement {
                cow_id: cow,
                sensor_id: sensor,
                timestamp: at,
                value: Some(value),
                unit: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn range_scan_uses_half_open_window_and_orders_by_time() {
        let (store, cow, scale, _) = seeded().await;
        insert(&store, cow, scale, ts(15, 0), 430.0).await;
        insert(&store, cow, scale, ts(1, 0), 420.0).await;
        insert(&store, cow, scale, ts(10, 0), 425.0).await;

        let query = MeasurementQuery::for_cow(cow).within(TimeRange::new(Some(ts(1, 0)), Some(ts(15, 0))));
        let found = store.query_measurements(&query).await.unwrap();
        let values: Vec<_> = found.iter().map(|m| m.value.unwrap()).collect();
        assert_eq!(values, vec![420.0, 425.0]);
    }

    #[tokio::test]
    async fn sensor_and_kind_filters_narrow_results() {
        let (store, cow, scale, meter) = seeded().await;
        insert(&store, cow, scale, ts(1, 0), 420.0).await;
        insert(&store, cow, meter, ts(1, 6), 18.0).await;
        insert(&store, cow, meter, ts(2, 6), 21.0).await;

        let by_sensor = store
            .query_measurements(&MeasurementQuery::for_sensor(meter))
            .await
            .unwrap();
        assert_eq!(by_sensor.len(), 2);

        let by_kind = store
            .count_measurements(&MeasurementQuery::for_kind(SensorKind::Weight))
            .await
            .unwrap();
        assert_eq!(by_kind, 1);
    }

    #[tokio::test]
    async fn paging_skips_and_limits_after_ordering() {
        let (store, cow, _, meter) = seeded().await;
        for day in 1..=5 {
            insert(&store, cow, meter, ts(day, 6), f64::from(day)).await;
        }
        let page = store
            .query_measurements(&MeasurementQuery::for_cow(cow).page(1, 2))
            .await
            .unwrap();
        let values: Vec<_> = page.iter().map(|m| m.value.unwrap()).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn keyset_cursor_resumes_after_last_reading() {
        let (store, cow, scale, meter) = seeded().await;
        for day in 1..=4 {
            insert(&store, cow, meter, ts(day, 6), f64::from(day)).await;
        }
        insert(&store, cow, scale, ts(3, 6), 420.0).await;

        let by_kind = MeasurementQuery::for_kind(SensorKind::MilkYield).page(0, 2);
        let first = store.query_measurements(&by_kind).await.unwrap();
        assert_eq!(first.len(), 2);

        let next = by_kind.clone().after(&first[1]);
        let rest = store.query_measurements(&next).await.unwrap();
        let values: Vec<_> = rest.iter().map(|m| m.value.unwrap()).collect();
        assert_eq!(values, vec![3.0, 4.0]);

        let per_cow = MeasurementQuery::for_cow(cow)
            .within(TimeRange::new(Some(ts(1, 0)), Some(ts(4, 0))))
            .after(&first[1]);
        assert_eq!(store.count_measurements(&per_cow).await.unwrap(), 2);

        let past_end = MeasurementQuery::for_cow(cow)
            .within(TimeRange::new(None, Some(ts(2, 0))))
            .after(&rest[1]);
        assert!(store.query_measurements(&past_end).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn latest_by_kind_ignores_invalid_readings() {
        let (store, cow, scale, meter) = seeded().await;
        insert(&store, cow, scale, ts(1, 0), 420.0).await;
        insert(&store, cow, meter, ts(2, 6), 20.0).await;
        store
            .insert_measurement(&NewMeasurement {
                cow_id: cow,
                sensor_id: scale,
                timestamp: ts(3, 0),
                value: Some(-1.0),
                unit: None,
            })
            .await
            .unwrap();

        let latest = store.latest_by_kind(cow).await.unwrap();
        assert_eq!(latest.len(), 2);
        let weight = latest.iter().find(|m| m.kind == SensorKind::Weight).unwrap();
        assert_eq!(weight.value, Some(420.0));
    }

    #[tokio::test]
    async fn wipe_keeps_ids_increasing() {
        let (store, cow, scale, _) = seeded().await;
        let first = insert(&store, cow, scale, ts(1, 0), 420.0).await;
        store.wipe_all().await.unwrap();
        assert_eq!(store.counts().await.unwrap().total(), 0);

        let (cow, scale, _) = seed(&store).await;
        let second = insert(&store, cow, scale, ts(1, 0), 420.0).await;
        assert!(second > first);
    }

    #[tokio::test]
    async fn reversed_range_matches_nothing() {
        let (store, cow, scale, _) = seeded().await;
        insert(&store, cow, scale, ts(5, 0), 420.0).await;
        let query = MeasurementQuery::for_cow(cow).within(TimeRange::new(Some(ts(6, 0)), Some(ts(1, 0))));
        assert_eq!(store.count_measurements(&query).await.unwrap(), 0);
    }
}
