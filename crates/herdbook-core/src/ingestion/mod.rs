//! Bulk loader: turns the three input datasets into store writes.
//!
//! Cows and sensors are written to completion before the first measurement is
//! submitted. Every dataset is driven through a bounded pool of
//! `concurrency_limit` in-flight writes, and the next row is pulled from the
//! source only when a slot frees up, so memory stays flat regardless of
//! dataset size.

mod requests;
mod sink;
mod summary;

use std::pin::pin;

use futures::stream::{self, StreamExt};
use herdbook_datasets::{
    CowRow, DatasetDirectory, DatasetError, MeasurementRow, MeasurementRows, ParsedRow, RowError,
    SensorRow,
};
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::error::{FailureClass, IngestError, StoreError};

pub use requests::{Dataset, WriteRequest};
pub use sink::{DryRunSink, StoreSink, WriteOutcome, WriteSink};
pub use summary::{DatasetCounts, IngestSummary};

/// Rows to load. Measurements are any fallible row source; in production this
/// is the chunked reader from [`DatasetDirectory::measurements`].
pub struct IngestInput<M> {
    pub cows: Vec<ParsedRow<CowRow>>,
    pub sensors: Vec<ParsedRow<SensorRow>>,
    pub measurements: M,
    pub measurement_rows: usize,
}

impl IngestInput<MeasurementRows> {
    pub fn load(dir: &DatasetDirectory, chunk_size: usize) -> Result<Self, DatasetError> {
        let cows = dir.read_cows()?;
        let sensors = dir.read_sensors()?;
        let source = dir.measurements(chunk_size)?;
        info!(
            cows = cows.len(),
            sensors = sensors.len(),
            measurements = source.total_rows(),
            chunk_size = source.chunk_size(),
            "Opened datasets"
        );
        Ok(Self {
            cows,
            sensors,
            measurement_rows: source.total_rows(),
            measurements: source.rows(),
        })
    }
}

type MeasurementItems = std::vec::IntoIter<Result<ParsedRow<MeasurementRow>, DatasetError>>;

impl IngestInput<MeasurementItems> {
    pub fn in_memory(
        cows: Vec<ParsedRow<CowRow>>,
        sensors: Vec<ParsedRow<SensorRow>>,
        measurements: Vec<ParsedRow<MeasurementRow>>,
    ) -> Self {
        let measurement_rows = measurements.len();
        Self {
            cows,
            sensors,
            measurements: measurements
                .into_iter()
                .map(Ok)
                .collect::<Vec<_>>()
                .into_iter(),
            measurement_rows,
        }
    }
}

/// How a single request ended after any retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Applied,
    Duplicate,
    Failed,
}

enum Step {
    Delivered(Delivery),
    Skipped(RowError),
}

pub struct IngestPipeline<'a> {
    sink: &'a dyn WriteSink,
    config: IngestConfig,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(sink: &'a dyn WriteSink, config: IngestConfig) -> Result<Self, IngestError> {
        config
            .validate()
            .map_err(|err| IngestError::Config(err.to_string()))?;
        Ok(Self { sink, config })
    }

    pub async fn run<M>(&self, input: IngestInput<M>) -> Result<IngestSummary, IngestError>
    where
        M: Iterator<Item = Result<ParsedRow<MeasurementRow>, DatasetError>>,
    {
        let mut summary = IngestSummary {
            dry_run: self.config.dry_run,
            ..IngestSummary::default()
        };
        info!(
            dry_run = self.config.dry_run,
            concurrency_limit = self.config.concurrency_limit,
            "Starting bulk load"
        );

        let cows = input.cows.len();
        self.drain(
            Dataset::Cows,
            input.cows.into_iter().map(|row| Ok(row.map(WriteRequest::from))),
            cows,
            &mut summary,
        )
        .await?;

        let sensors = input.sensors.len();
        self.drain(
            Dataset::Sensors,
            input.sensors.into_iter().map(|row| Ok(row.map(WriteRequest::from))),
            sensors,
            &mut summary,
        )
        .await?;

        self.drain(
            Dataset::Measurements,
            input
                .measurements
                .map(|row| row.map(|row| row.map(WriteRequest::from))),
            input.measurement_rows,
            &mut summary,
        )
        .await?;

        info!(
            submitted = summary.measurements.submitted,
            duplicate = summary.measurements.duplicate,
            failed = summary.measurements.failed,
            skipped = summary.measurements.skipped,
            "Bulk load finished"
        );
        Ok(summary)
    }

    async fn drain<I>(
        &self,
        dataset: Dataset,
        rows: I,
        expected: usize,
        summary: &mut IngestSummary,
    ) -> Result<(), IngestError>
    where
        I: Iterator<Item = Result<ParsedRow<WriteRequest>, DatasetError>>,
    {
        let progress_every = self.config.progress_interval(expected);
        let steps = stream::iter(rows)
            .map(|row| self.step(row))
            .buffer_unordered(self.config.concurrency_limit);
        let mut steps = pin!(steps);

        while let Some(step) = steps.next().await {
            let counts = summary.counts_mut(dataset);
            let step = match step {
                Ok(step) => step,
                Err(err) => {
                    error!(
                        %dataset,
                        processed = counts.total,
                        error = %err,
                        "Aborting bulk load"
                    );
                    return Err(err);
                }
            };

            counts.total += 1;
            match step {
                Step::Delivered(Delivery::Applied) => counts.submitted += 1,
                Step::Delivered(Delivery::Duplicate) => counts.duplicate += 1,
                Step::Delivered(Delivery::Failed) => counts.failed += 1,
                Step::Skipped(error) => {
                    warn!(%dataset, row = error.row(), error = %error, "Skipping malformed row");
                    counts.skipped += 1;
                }
            }

            if dataset == Dataset::Measurements && counts.total % progress_every == 0 {
                info!(
                    processed = counts.total,
                    total = expected,
                    failed = counts.failed,
                    "Measurement progress"
                );
            }
        }

        let counts = summary.counts(dataset);
        info!(
            %dataset,
            rows = counts.total,
            submitted = counts.submitted,
            duplicate = counts.duplicate,
            failed = counts.failed,
            skipped = counts.skipped,
            "Dataset loaded"
        );
        Ok(())
    }

    async fn step(
        &self,
        row: Result<ParsedRow<WriteRequest>, DatasetError>,
    ) -> Result<Step, IngestError> {
        match row?.record {
            Err(error) => Ok(Step::Skipped(error)),
            Ok(request) => self
                .deliver(&request)
                .await
                .map(Step::Delivered)
                .map_err(IngestError::Store),
        }
    }

    /// Submits one request, retrying transient failures with a linear backoff.
    /// Only fatal store errors are returned as `Err`.
    async fn deliver(&self, request: &WriteRequest) -> Result<Delivery, StoreError> {
        let mut attempt = 1;
        loop {
            let err = match self.sink.submit(request).await {
                Ok(WriteOutcome::Applied) => return Ok(Delivery::Applied),
                Ok(WriteOutcome::Duplicate) => return Ok(Delivery::Duplicate),
                Err(err) => err,
            };

            match err.class() {
                FailureClass::Conflict => {
                    debug!(dataset = %request.dataset(), "Record already present");
                    return Ok(Delivery::Duplicate);
                }
                FailureClass::Invalid => {
                    warn!(dataset = %request.dataset(), error = %err, "Store rejected record");
                    return Ok(Delivery::Failed);
                }
                FailureClass::Transient if attempt < self.config.max_attempts => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        dataset = %request.dataset(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                FailureClass::Transient => {
                    warn!(
                        dataset = %request.dataset(),
                        attempts = attempt,
                        error = %err,
                        "Giving up on record"
                    );
                    return Ok(Delivery::Failed);
                }
                FailureClass::Fatal => return Err(err),
            }
        }
    }
}
