//! Read-only aggregations over stored measurements.
//!
//! Each report is a single keyset-paged range scan over one sensor kind,
//! grouped by cow in memory. Invalid readings never reach the grouping stage.

mod anomaly;
mod milk;
mod render;
mod weights;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ReportConfig;
use crate::error::{ConfigError, ReportError};
use crate::store::MeasurementStore;
use crate::types::{start_of_day, Measurement, MeasurementQuery, SensorKind, TimeRange};

pub use anomaly::{AnomalyRule, Assessment, Direction, SeriesPoint, TrailingMeanDeviation};
pub use milk::{DailyMilkRow, MilkReport, MilkReportRow};
pub use render::{milk_file_name, render, weights_file_name, ReportFormat, Tabular};
pub use weights::{DataStatus, WeightReport, WeightReportRow};

use weights::TrailingSeries;

#[derive(Debug, Default)]
struct MilkTally {
    total: f64,
    count: usize,
    days: BTreeMap<NaiveDate, (f64, usize)>,
}

pub struct ReportEngine<'a> {
    store: &'a dyn MeasurementStore,
    config: ReportConfig,
    rule: Box<dyn AnomalyRule>,
}

impl<'a> ReportEngine<'a> {
    pub fn new(store: &'a dyn MeasurementStore, config: ReportConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rule = Box::new(config.anomaly_rule());
        Ok(Self {
            store,
            config,
            rule,
        })
    }

    /// Replaces the anomaly rule derived from the config.
    pub fn with_rule(mut self, rule: impl AnomalyRule + 'static) -> Self {
        self.rule = Box::new(rule);
        self
    }

    /// Latest valid weight per cow at or before the end of `as_of` (UTC).
    /// Cows without any such reading are left out.
    pub async fn weights(&self, as_of: NaiveDate) -> Result<WeightReport, ReportError> {
        let lookback = self.rule.lookback();
        let mut series = TrailingSeries::default();
        let scanned = self
            .scan(SensorKind::Weight, TimeRange::through_day(as_of), |m| {
                if let Some(value) = m.valid_value() {
                    series.push(
                        m.cow_id,
                        SeriesPoint {
                            timestamp: m.timestamp,
                            value,
                        },
                        lookback,
                    );
                }
            })
            .await?;

        let rows: Vec<WeightReportRow> = series
            .into_series()
            .filter_map(|(cow_id, points)| {
                let latest = *points.last()?;
                let assessment = self.rule.assess(&points);
                Some(WeightReportRow {
                    cow_id,
                    weight_value: latest.value,
                    measurement_timestamp: latest.timestamp,
                    baseline_mean: assessment.baseline,
                    deviation_pct: assessment.deviation_pct,
                    status: self.status(as_of, latest.timestamp),
                    anomalous: assessment.anomalous,
                })
            })
            .collect();

        info!(%as_of, scanned, cows = rows.len(), "Built weight report");
        Ok(WeightReport { as_of, rows })
    }

    /// Valid milk per cow over the whole days `start..=end` (UTC). Every cow in
    /// the store gets a row; cows without readings report zero.
    pub async fn milk(&self, start: NaiveDate, end: NaiveDate) -> Result<MilkReport, ReportError> {
        let tallies = self.milk_tallies(start, end).await?;
        let cows = self.all_cows().await?;

        let rows: Vec<MilkReportRow> = cows
            .into_iter()
            .map(|(cow_id, cow_name)| {
                let Some(tally) = tallies.get(&cow_id) else {
                    return MilkReportRow {
                        cow_id,
                        cow_name,
                        total_milk_volume: 0.0,
                        measurement_count: 0,
                        baseline_daily_volume: None,
                        anomalous: false,
                    };
                };
                let daily: Vec<SeriesPoint> = tally
                    .days
                    .iter()
                    .map(|(day, (volume, _))| SeriesPoint {
                        timestamp: start_of_day(*day),
                        value: *volume,
                    })
                    .collect();
                let assessment = self.rule.assess(&daily);
                MilkReportRow {
                    cow_id,
                    cow_name,
                    total_milk_volume: tally.total,
                    measurement_count: tally.count,
                    baseline_daily_volume: assessment.baseline,
                    anomalous: assessment.anomalous,
                }
            })
            .collect();

        info!(%start, %end, cows = rows.len(), "Built milk report");
        Ok(MilkReport { start, end, rows })
    }

    /// Per-cow, per-day milk totals over `start..=end`, ordered by cow then day.
    pub async fn milk_daily(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyMilkRow>, ReportError> {
        let tallies = self.milk_tallies(start, end).await?;
        Ok(tallies
            .into_iter()
            .flat_map(|(cow_id, tally)| {
                tally
                    .days
                    .into_iter()
                    .map(move |(day, (milk_volume, measurement_count))| DailyMilkRow {
                        cow_id,
                        day,
                        milk_volume,
                        measurement_count,
                    })
            })
            .collect())
    }

    async fn milk_tallies(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<Uuid, MilkTally>, ReportError> {
        if start > end {
            return Err(ReportError::InvalidRange { start, end });
        }

        let mut tallies: BTreeMap<Uuid, MilkTally> = BTreeMap::new();
        self.scan(SensorKind::MilkYield, TimeRange::days(start, end), |m| {
            if let Some(value) = m.valid_value() {
                let tally = tallies.entry(m.cow_id).or_default();
                tally.total += value;
                tally.count += 1;
                let day = tally.days.entry(m.timestamp.date_naive()).or_default();
                day.0 += value;
                day.1 += 1;
            }
        })
        .await?;
        Ok(tallies)
    }

    /// Cow ids and names in store order (name, then id).
    async fn all_cows(&self) -> Result<Vec<(Uuid, String)>, ReportError> {
        let mut cows = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.store.list_cows(offset, self.config.page_size).await?;
            let fetched = page.items.len();
            cows.extend(page.items.into_iter().map(|cow| (cow.id, cow.name)));
            offset += fetched;
            if fetched < self.config.page_size || offset >= page.total {
                return Ok(cows);
            }
        }
    }

    /// Feeds every valid reading of `kind` in `range` to `visit`, oldest first.
    /// Pages are chained by `(timestamp, id)` cursor, so readings written
    /// mid-scan never shift a page boundary. Returns the number visited.
    async fn scan<F>(&self, kind: SensorKind, range: TimeRange, mut visit: F) -> Result<usize, ReportError>
    where
        F: FnMut(&Measurement),
    {
        let base = MeasurementQuery::for_kind(kind.clone())
            .within(range)
            .valid_only()
            .page(0, self.config.page_size);
        let mut query = base.clone();
        let mut scanned = 0;
        loop {
            let page = self.store.query_measurements(&query).await?;
            page.iter().for_each(&mut visit);
            scanned += page.len();
            debug!(%kind, scanned, "Scanned report page");
            match page.last() {
                Some(last) if page.len() == self.config.page_size => {
                    query = base.clone().after(last);
                }
                _ => return Ok(scanned),
            }
        }
    }

    fn status(&self, as_of: NaiveDate, latest: DateTime<Utc>) -> DataStatus {
        let age_days = as_of.signed_duration_since(latest.date_naive()).num_days();
        if age_days > self.config.stale_after_days {
            DataStatus::Stale
        } else {
            DataStatus::Active
        }
    }
}
