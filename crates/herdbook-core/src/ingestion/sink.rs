use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use super::requests::WriteRequest;
use crate::error::{IngestError, StoreError};
use crate::store::MeasurementStore;
use crate::types::Upserted;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The record was already present; nothing changed.
    Duplicate,
}

/// Where the loader sends write requests.
#[async_trait]
pub trait WriteSink: Send + Sync {
    async fn submit(&self, request: &WriteRequest) -> Result<WriteOutcome, StoreError>;
}

/// Applies requests to a [`MeasurementStore`].
pub struct StoreSink<'a> {
    store: &'a dyn MeasurementStore,
}

impl<'a> StoreSink<'a> {
    pub fn new(store: &'a dyn MeasurementStore) -> Self {
        Self { store }
    }
}

fn outcome(upserted: Upserted) -> WriteOutcome {
    match upserted {
        Upserted::Created => WriteOutcome::Applied,
        Upserted::Existing => WriteOutcome::Duplicate,
    }
}

#[async_trait]
impl WriteSink for StoreSink<'_> {
    async fn submit(&self, request: &WriteRequest) -> Result<WriteOutcome, StoreError> {
        match request {
            WriteRequest::UpsertCow(cow) => self.store.upsert_cow(cow).await.map(outcome),
            WriteRequest::UpsertSensor(sensor) => self.store.upsert_sensor(sensor).await.map(outcome),
            WriteRequest::InsertMeasurement(measurement) => {
                match self.store.insert_measurement(measurement).await {
                    Ok(_) => Ok(WriteOutcome::Applied),
                    Err(StoreError::Conflict(_)) => Ok(WriteOutcome::Duplicate),
                    Err(err) => Err(err),
                }
            }
        }
    }
}

/// Logs every request instead of writing it.
///
/// Payloads are streamed to a JSON-lines file when one is given, and kept in
/// memory only in recording mode. A plain dry run holds nothing but a count.
#[derive(Debug, Default)]
pub struct DryRunSink {
    state: Mutex<DryRunState>,
}

#[derive(Debug, Default)]
struct DryRunState {
    submitted: usize,
    log: Option<PayloadLog>,
    recorded: Option<Vec<String>>,
}

#[derive(Debug)]
struct PayloadLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl DryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps every payload in memory for [`DryRunSink::payloads`].
    pub fn recording() -> Self {
        Self {
            state: Mutex::new(DryRunState {
                recorded: Some(Vec::new()),
                ..DryRunState::default()
            }),
        }
    }

    /// Streams each payload to `path` as one JSON object per line.
    pub fn with_payload_log(path: &Path) -> Result<Self, IngestError> {
        let file = File::create(path).map_err(|source| IngestError::PayloadLog {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            state: Mutex::new(DryRunState {
                log: Some(PayloadLog {
                    path: path.to_path_buf(),
                    writer: BufWriter::new(file),
                }),
                ..DryRunState::default()
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, DryRunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded payloads in submission order; empty unless recording.
    pub fn payloads(&self) -> Vec<String> {
        self.state().recorded.clone().unwrap_or_default()
    }

    /// Flushes the payload file, if any. Returns how many payloads were submitted.
    pub fn finish(&self) -> Result<usize, IngestError> {
        let mut state = self.state();
        if let Some(log) = state.log.as_mut() {
            log.writer.flush().map_err(|source| IngestError::PayloadLog {
                path: log.path.clone(),
                source,
            })?;
        }
        Ok(state.submitted)
    }
}

#[async_trait]
impl WriteSink for DryRunSink {
    async fn submit(&self, request: &WriteRequest) -> Result<WriteOutcome, StoreError> {
        let payload = request
            .payload()
            .map_err(|err| StoreError::Invalid(format!("unserializable request: {err}")))?;
        debug!(dataset = %request.dataset(), %payload, "Dry run: would submit");

        let mut state = self.state();
        if let Some(log) = state.log.as_mut() {
            writeln!(log.writer, "{payload}")
                .map_err(|err| StoreError::Sink(format!("{}: {err}", log.path.display())))?;
        }
        if let Some(recorded) = state.recorded.as_mut() {
            recorded.push(payload);
        }
        state.submitted += 1;
        Ok(WriteOutcome::Applied)
    }
}
