mod common;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Duration;
use common::{at, day, reading, Barn};
use herdbook_core::config::ReportConfig;
use herdbook_core::error::{ReportError, StoreError};
use herdbook_core::reports::{
    render, AnomalyRule, Assessment, DataStatus, ReportEngine, ReportFormat, SeriesPoint,
};
use herdbook_core::store::{InMemoryStore, MeasurementStore};
use herdbook_core::types::{
    Cow, Measurement, MeasurementQuery, NewCow, NewMeasurement, NewSensor, Page, Sensor,
    StoreCounts, Upserted,
};
use uuid::Uuid;

fn small_pages() -> ReportConfig {
    ReportConfig {
        page_size: 2,
        ..ReportConfig::default()
    }
}

#[tokio::test]
async fn weight_report_picks_latest_reading_as_of_date() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.weigh(&bessie, at(6, 1, 8, 0), 420.0).await;
    barn.weigh(&bessie, at(6, 15, 8, 0), 430.0).await;
    let engine = ReportEngine::new(&barn.store, small_pages()).unwrap();

    let end_of_june = engine.weights(day(6, 30)).await.unwrap();
    let row = end_of_june.row(bessie.id).unwrap();
    assert_eq!(row.weight_value, 430.0);
    assert_eq!(row.measurement_timestamp, at(6, 15, 8, 0));

    let june_tenth = engine.weights(day(6, 10)).await.unwrap();
    let row = june_tenth.row(bessie.id).unwrap();
    assert_eq!(row.weight_value, 420.0);
    assert_eq!(row.measurement_timestamp, at(6, 1, 8, 0));
}

#[tokio::test]
async fn cows_without_weights_before_the_date_are_omitted() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    let daisy = barn.cow("Daisy").await;
    barn.weigh(&bessie, at(6, 1, 8, 0), 420.0).await;
    barn.weigh(&daisy, at(6, 20, 8, 0), 515.0).await;
    let engine = ReportEngine::new(&barn.store, small_pages()).unwrap();

    let report = engine.weights(day(6, 10)).await.unwrap();
    assert_eq!(report.rows.len(), 1);
    assert!(report.row(daisy.id).is_none());

    assert!(engine.weights(day(5, 31)).await.unwrap().rows.is_empty());
}

#[tokio::test]
async fn as_of_date_includes_the_whole_day() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.weigh(&bessie, at(6, 10, 23, 59), 425.0).await;
    barn.weigh(&bessie, at(6, 11, 0, 0), 426.0).await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();

    let report = engine.weights(day(6, 10)).await.unwrap();
    assert_eq!(report.row(bessie.id).unwrap().weight_value, 425.0);
}

#[tokio::test]
async fn timestamp_ties_go_to_the_newest_record() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    let second_scale = common::new_sensor(herdbook_core::types::SensorKind::Weight, "kg");
    barn.store.upsert_sensor(&second_scale).await.unwrap();

    barn.weigh(&bessie, at(6, 5, 8, 0), 420.0).await;
    barn.store
        .insert_measurement(&reading(&bessie, &second_scale, at(6, 5, 8, 0), 422.0))
        .await
        .unwrap();
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();

    let report = engine.weights(day(6, 5)).await.unwrap();
    assert_eq!(report.row(bessie.id).unwrap().weight_value, 422.0);
}

#[tokio::test]
async fn invalid_weights_are_ignored() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.weigh(&bessie, at(6, 1, 8, 0), 420.0).await;
    barn.weigh(&bessie, at(6, 2, 8, 0), -5.0).await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();

    let report = engine.weights(day(6, 30)).await.unwrap();
    assert_eq!(report.row(bessie.id).unwrap().weight_value, 420.0);
}

#[tokio::test]
async fn weight_rows_carry_baseline_status_and_anomaly() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    let daisy = barn.cow("Daisy").await;
    for (d, kg) in [(1, 400.0), (5, 400.0), (10, 370.0)] {
        barn.weigh(&bessie, at(6, d, 8, 0), kg).await;
    }
    for (d, kg) in [(1, 500.0), (11, 498.0)] {
        barn.weigh(&daisy, at(6, d, 8, 0), kg).await;
    }
    let engine = ReportEngine::new(&barn.store, small_pages()).unwrap();

    let report = engine.weights(day(6, 12)).await.unwrap();
    let bessie_row = report.row(bessie.id).unwrap();
    assert_eq!(bessie_row.baseline_mean, Some(400.0));
    assert!(bessie_row.anomalous);
    assert_eq!(bessie_row.status, DataStatus::Active);

    let daisy_row = report.row(daisy.id).unwrap();
    assert!(!daisy_row.anomalous);

    let later = engine.weights(day(6, 30)).await.unwrap();
    assert_eq!(later.row(daisy.id).unwrap().status, DataStatus::Stale);
}

#[tokio::test]
async fn milk_report_sums_valid_volumes_and_zero_fills() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    let daisy = barn.cow("Daisy").await;
    barn.milk(&bessie, at(6, 3, 6, 0), 15.0).await;
    barn.milk(&bessie, at(6, 20, 6, 0), 25.0).await;
    barn.milk(&bessie, at(6, 21, 6, 0), -3.0).await;
    barn.milk(&bessie, at(7, 1, 0, 0), 99.0).await;
    let engine = ReportEngine::new(&barn.store, small_pages()).unwrap();

    let june = engine.milk(day(6, 1), day(6, 30)).await.unwrap();
    assert_eq!(june.rows.len(), 2);
    let row = june.row(bessie.id).unwrap();
    assert_eq!(row.total_milk_volume, 40.0);
    assert_eq!(row.measurement_count, 2);
    let empty = june.row(daisy.id).unwrap();
    assert_eq!(empty.total_milk_volume, 0.0);
    assert_eq!(empty.measurement_count, 0);

    let quiet_week = engine.milk(day(6, 10), day(6, 15)).await.unwrap();
    let row = quiet_week.row(bessie.id).unwrap();
    assert_eq!(row.total_milk_volume, 0.0);
    assert_eq!(row.measurement_count, 0);
}

#[tokio::test]
async fn milk_range_includes_the_whole_end_day() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.milk(&bessie, at(6, 30, 23, 59), 10.0).await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();

    let report = engine.milk(day(6, 30), day(6, 30)).await.unwrap();
    assert_eq!(report.row(bessie.id).unwrap().measurement_count, 1);
}

#[tokio::test]
async fn reversed_milk_range_is_rejected() {
    let barn = Barn::new().await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();
    let err = engine.milk(day(6, 30), day(6, 1)).await.unwrap_err();
    assert!(matches!(err, ReportError::InvalidRange { .. }));
}

#[tokio::test]
async fn daily_breakdown_groups_by_cow_and_day() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.milk(&bessie, at(6, 3, 6, 0), 15.0).await;
    barn.milk(&bessie, at(6, 3, 18, 0), 12.5).await;
    barn.milk(&bessie, at(6, 4, 6, 0), 14.0).await;
    let engine = ReportEngine::new(&barn.store, small_pages()).unwrap();

    let daily = engine.milk_daily(day(6, 1), day(6, 30)).await.unwrap();
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0].day, day(6, 3));
    assert_eq!(daily[0].milk_volume, 27.5);
    assert_eq!(daily[0].measurement_count, 2);
    assert_eq!(daily[1].day, day(6, 4));
}

#[tokio::test]
async fn sharp_drop_in_daily_milk_is_flagged() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    for d in 1..=5 {
        barn.milk(&bessie, at(6, d, 6, 0), 30.0).await;
    }
    barn.milk(&bessie, at(6, 6, 6, 0), 20.0).await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();

    let report = engine.milk(day(6, 1), day(6, 6)).await.unwrap();
    let row = report.row(bessie.id).unwrap();
    assert_eq!(row.baseline_daily_volume, Some(30.0));
    assert!(row.anomalous);
}

/// Flags every series with at least two points.
struct AlwaysFlag;

impl AnomalyRule for AlwaysFlag {
    fn lookback(&self) -> Duration {
        Duration::days(365)
    }

    fn assess(&self, series: &[SeriesPoint]) -> Assessment {
        Assessment {
            baseline: None,
            deviation_pct: None,
            anomalous: series.len() > 1,
        }
    }
}

#[tokio::test]
async fn anomaly_rule_is_pluggable() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.weigh(&bessie, at(6, 1, 8, 0), 420.0).await;
    barn.weigh(&bessie, at(6, 2, 8, 0), 421.0).await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default())
        .unwrap()
        .with_rule(AlwaysFlag);

    let report = engine.weights(day(6, 2)).await.unwrap();
    assert!(report.row(bessie.id).unwrap().anomalous);
}

#[tokio::test]
async fn milk_report_renders_as_csv() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.milk(&bessie, at(6, 3, 6, 0), 15.0).await;
    let engine = ReportEngine::new(&barn.store, ReportConfig::default()).unwrap();

    let report = engine.milk(day(6, 1), day(6, 30)).await.unwrap();
    let csv = render(&report.rows, ReportFormat::Csv).unwrap();
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("cow_id,cow_name,total_milk_volume,measurement_count,baseline_daily_volume,anomalous")
    );
    assert_eq!(lines.next(), Some(format!("{},Bessie,15.00,1,,false", bessie.id).as_str()));
}

/// Writes one held-back reading right after the first page is served, the
/// way a concurrent load would.
struct BackfillingStore<'a> {
    inner: &'a InMemoryStore,
    pending: Mutex<Option<NewMeasurement>>,
}

#[async_trait]
impl MeasurementStore for BackfillingStore<'_> {
    async fn upsert_cow(&self, cow: &NewCow) -> Result<Upserted, StoreError> {
        self.inner.upsert_cow(cow).await
    }

    async fn upsert_sensor(&self, sensor: &NewSensor) -> Result<Upserted, StoreError> {
        self.inner.upsert_sensor(sensor).await
    }

    async fn insert_measurement(&self, new: &NewMeasurement) -> Result<Measurement, StoreError> {
        self.inner.insert_measurement(new).await
    }

    async fn query_measurements(
        &self,
        query: &MeasurementQuery,
    ) -> Result<Vec<Measurement>, StoreError> {
        let page = self.inner.query_measurements(query).await?;
        let pending = self.pending.lock().unwrap().take();
        if let Some(backfill) = pending {
            self.inner.insert_measurement(&backfill).await?;
        }
        Ok(page)
    }

    async fn count_measurements(&self, query: &MeasurementQuery) -> Result<usize, StoreError> {
        self.inner.count_measurements(query).await
    }

    async fn get_cow(&self, id: Uuid) -> Result<Option<Cow>, StoreError> {
        self.inner.get_cow(id).await
    }

    async fn list_cows(&self, offset: usize, limit: usize) -> Result<Page<Cow>, StoreError> {
        self.inner.list_cows(offset, limit).await
    }

    async fn get_sensor(&self, id: Uuid) -> Result<Option<Sensor>, StoreError> {
        self.inner.get_sensor(id).await
    }

    async fn list_sensors(&self, offset: usize, limit: usize) -> Result<Page<Sensor>, StoreError> {
        self.inner.list_sensors(offset, limit).await
    }

    async fn get_measurement(&self, id: i64) -> Result<Option<Measurement>, StoreError> {
        self.inner.get_measurement(id).await
    }

    async fn latest_by_kind(&self, cow_id: Uuid) -> Result<Vec<Measurement>, StoreError> {
        self.inner.latest_by_kind(cow_id).await
    }

    async fn delete_cow(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_cow(id).await
    }

    async fn delete_sensor(&self, id: Uuid) -> Result<bool, StoreError> {
        self.inner.delete_sensor(id).await
    }

    async fn delete_measurement(&self, id: i64) -> Result<bool, StoreError> {
        self.inner.delete_measurement(id).await
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        self.inner.counts().await
    }

    async fn wipe_all(&self) -> Result<StoreCounts, StoreError> {
        self.inner.wipe_all().await
    }
}

#[tokio::test]
async fn backfilled_reading_between_pages_is_not_double_counted() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    barn.milk(&bessie, at(6, 3, 6, 0), 1.0).await;
    barn.milk(&bessie, at(6, 4, 6, 0), 2.0).await;
    barn.milk(&bessie, at(6, 5, 6, 0), 4.0).await;

    let store = BackfillingStore {
        inner: &barn.store,
        pending: Mutex::new(Some(reading(&bessie, &barn.meter, at(6, 1, 6, 0), 8.0))),
    };
    let engine = ReportEngine::new(&store, small_pages()).unwrap();

    let during = engine.milk(day(6, 1), day(6, 30)).await.unwrap();
    let row = during.row(bessie.id).unwrap();
    assert_eq!(row.total_milk_volume, 7.0);
    assert_eq!(row.measurement_count, 3);

    let after = engine.milk(day(6, 1), day(6, 30)).await.unwrap();
    let row = after.row(bessie.id).unwrap();
    assert_eq!(row.total_milk_volume, 15.0);
    assert_eq!(row.measurement_count, 4);
}

#[tokio::test]
async fn full_pages_chain_through_every_reading() {
    let barn = Barn::new().await;
    let bessie = barn.cow("Bessie").await;
    // Shared timestamps force the cursor to break ties on id.
    for hour in [6, 6, 18, 18, 18] {
        let cow = barn.cow(&format!("Cow {hour}")).await;
        barn.milk(&cow, at(6, 2, hour, 0), 1.0).await;
    }
    for d in 1..=4 {
        barn.milk(&bessie, at(6, d, 6, 0), 2.0).await;
    }
    let engine = ReportEngine::new(&barn.store, small_pages()).unwrap();

    let report = engine.milk(day(6, 1), day(6, 30)).await.unwrap();
    let total: f64 = report.rows.iter().map(|row| row.total_milk_volume).sum();
    let count: usize = report.rows.iter().map(|row| row.measurement_count).sum();
    assert_eq!(total, 13.0);
    assert_eq!(count, 9);
}
