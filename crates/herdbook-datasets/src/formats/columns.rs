use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use uuid::Uuid;

use crate::errors::DatasetError;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// A collected chunk of one dataset, with typed accessors that report
/// dataset-level problems (missing column, unusable type) as `DatasetError`.
pub(crate) struct Frame<'a> {
    dataset: &'static str,
    df: &'a DataFrame,
}

impl<'a> Frame<'a> {
    pub fn new(dataset: &'static str, df: &'a DataFrame) -> Self {
        Self { dataset, df }
    }

    fn column(&self, name: &'static str) -> Result<&Column, DatasetError> {
        self.df
            .column(name)
            .map_err(|_| DatasetError::MissingColumn {
                dataset: self.dataset,
                column: name,
            })
    }

    fn has_column(&self, name: &str) -> bool {
        self.df.column(name).is_ok()
    }

    pub fn text(&self, name: &'static str) -> Result<TextColumn, DatasetError> {
        let column = self.column(name)?;
        let cast = column
            .cast(&DataType::String)
            .map_err(DatasetError::polars(self.dataset))?;
        let values = cast.str().map_err(DatasetError::polars(self.dataset))?.clone();
        Ok(TextColumn { name, values })
    }

    pub fn optional_text(&self, name: &'static str) -> Result<Option<TextColumn>, DatasetError> {
        if self.has_column(name) {
            self.text(name).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn number(&self, name: &'static str) -> Result<NumberColumn, DatasetError> {
        let column = self.column(name)?;
        match column.dtype() {
            DataType::String => Ok(NumberColumn::Text(self.text(name)?)),
            dtype if is_numeric(dtype) => {
                let cast = column
                    .cast(&DataType::Float64)
                    .map_err(DatasetError::polars(self.dataset))?;
                let values = cast.f64().map_err(DatasetError::polars(self.dataset))?.clone();
                Ok(NumberColumn::Numeric(values))
            }
            DataType::Null => Ok(NumberColumn::Empty),
            other => Err(self.unsupported(name, other)),
        }
    }

    pub fn timestamps(&self, name: &'static str) -> Result<TimestampColumn, DatasetError> {
        let column = self.column(name)?;
        let physical = |target: &DataType| {
            column
                .cast(target)
                .map_err(DatasetError::polars(self.dataset))
        };

        match column.dtype() {
            DataType::Datetime(unit, _) => {
                let cast = physical(&DataType::Int64)?;
                let values = cast.i64().map_err(DatasetError::polars(self.dataset))?.clone();
                Ok(TimestampColumn::Physical {
                    values,
                    unit: *unit,
                })
            }
            DataType::Date => {
                let cast = physical(&DataType::Int32)?;
                let values = cast.i32().map_err(DatasetError::polars(self.dataset))?.clone();
                Ok(TimestampColumn::Days(values))
            }
            DataType::String => Ok(TimestampColumn::Text(self.text(name)?)),
            dtype if is_numeric(dtype) => {
                let cast = physical(&DataType::Float64)?;
                let values = cast.f64().map_err(DatasetError::polars(self.dataset))?.clone();
                Ok(TimestampColumn::EpochSeconds(values))
            }
            other => Err(self.unsupported(name, other)),
        }
    }

    fn unsupported(&self, column: &'static str, dtype: &DataType) -> DatasetError {
        DatasetError::UnsupportedType {
            dataset: self.dataset,
            column,
            dtype: dtype.to_string(),
        }
    }
}

fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt32
            | DataType::UInt64
    )
}

pub(crate) struct TextColumn {
    pub name: &'static str,
    values: StringChunked,
}

impl TextColumn {
    /// Trimmed cell value; blank cells read as `None`.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values
            .get(idx)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn uuid(&self, idx: usize) -> Option<Result<Uuid, (String, String)>> {
        self.get(idx).map(|raw| {
            Uuid::parse_str(raw).map_err(|err| (raw.to_string(), err.to_string()))
        })
    }

    pub fn date(&self, idx: usize) -> Option<Result<NaiveDate, (String, String)>> {
        self.get(idx).map(|raw| {
            // Date and datetime columns stringify as "YYYY-MM-DD[ HH:MM:SS]".
            let day = raw.get(..10).unwrap_or(raw);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map_err(|err| (raw.to_string(), err.to_string()))
        })
    }
}

pub(crate) enum NumberColumn {
    Numeric(Float64Chunked),
    Text(TextColumn),
    Empty,
}

impl NumberColumn {
    pub fn get(&self, idx: usize) -> Result<Option<f64>, (String, String)> {
        match self {
            NumberColumn::Numeric(values) => Ok(values.get(idx).filter(|v| !v.is_nan())),
            NumberColumn::Text(text) => match text.get(idx) {
                None => Ok(None),
                Some(raw) if raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null") => {
                    Ok(None)
                }
                Some(raw) => raw
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|err| (raw.to_string(), err.to_string())),
            },
            NumberColumn::Empty => Ok(None),
        }
    }
}

pub(crate) enum TimestampColumn {
    Physical { values: Int64Chunked, unit: TimeUnit },
    Days(Int32Chunked),
    EpochSeconds(Float64Chunked),
    Text(TextColumn),
}

impl TimestampColumn {
    pub fn get(&self, idx: usize) -> Option<Result<DateTime<Utc>, (String, String)>> {
        match self {
            TimestampColumn::Physical { values, unit } => {
                let raw = values.get(idx)?;
                let parsed = match unit {
                    TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(raw)),
                    TimeUnit::Microseconds => DateTime::from_timestamp_micros(raw),
                    TimeUnit::Milliseconds => DateTime::from_timestamp_millis(raw),
                };
                Some(parsed.ok_or_else(|| (raw.to_string(), "timestamp out of range".to_string())))
            }
            TimestampColumn::Days(values) => {
                let days = values.get(idx)?;
                let parsed = DateTime::from_timestamp(i64::from(days) * 86_400, 0);
                Some(parsed.ok_or_else(|| (days.to_string(), "date out of range".to_string())))
            }
            TimestampColumn::EpochSeconds(values) => {
                let secs = values.get(idx).filter(|v| !v.is_nan())?;
                Some(from_epoch_seconds(secs).map_err(|reason| (secs.to_string(), reason)))
            }
            TimestampColumn::Text(text) => {
                let raw = text.get(idx)?;
                Some(parse_timestamp_text(raw).map_err(|reason| (raw.to_string(), reason)))
            }
        }
    }
}

pub(crate) fn from_epoch_seconds(secs: f64) -> Result<DateTime<Utc>, String> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err("epoch seconds must be a positive number".to_string());
    }
    let micros = (secs * MICROS_PER_SECOND).round() as i64;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| "timestamp out of range".to_string())
}

pub(crate) fn parse_timestamp_text(raw: &str) -> Result<DateTime<Utc>, String> {
    static NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
    ];

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt.and_utc());
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(day.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    match raw.parse::<f64>() {
        Ok(secs) => from_epoch_seconds(secs),
        Err(_) => Err("expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or epoch seconds".to_string()),
    }
}
