use std::fmt;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::errors::{DatasetError, RowError};
use crate::formats::schema::{
    DatasetSchema, COWS, COW_SCHEMA, MEASUREMENTS, MEASUREMENT_SCHEMA, SENSORS, SENSOR_SCHEMA,
};
use crate::formats::{DatasetFormat, Frame, NumberColumn, TextColumn, TimestampColumn};
use crate::model::{CowRow, MeasurementRow, ParsedRow, SensorRow};

/// A directory holding the `cows`, `sensors` and `measurements` datasets.
#[derive(Debug, Clone)]
pub struct DatasetDirectory {
    root: PathBuf,
}

impl DatasetDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DatasetError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(DatasetError::MissingDirectory { path: root });
        }
        Ok(Self { root })
    }

    /// Finds `<dataset>.parquet` or `<dataset>.csv`, preferring Parquet.
    pub fn locate(&self, dataset: &'static str) -> Result<(PathBuf, DatasetFormat), DatasetError> {
        DatasetFormat::ALL
            .iter()
            .map(|format| (self.root.join(format!("{dataset}.{}", format.extension())), *format))
            .find(|(path, _)| path.is_file())
            .ok_or_else(|| DatasetError::MissingDataset {
                dataset,
                dir: self.root.clone(),
            })
    }

    fn scan(&self, schema: &DatasetSchema) -> Result<(LazyFrame, DatasetFormat), DatasetError> {
        let (path, format) = self.locate(schema.name)?;
        debug!(dataset = schema.name, path = %path.display(), %format, "Scanning dataset");

        let mut frame = format.scan(&path).map_err(DatasetError::polars(schema.name))?;
        let columns = frame
            .collect_schema()
            .map_err(DatasetError::polars(schema.name))?;
        for column in schema.required {
            if columns.get(column).is_none() {
                return Err(DatasetError::MissingColumn {
                    dataset: schema.name,
                    column: *column,
                });
            }
        }
        Ok((frame, format))
    }

    pub fn read_cows(&self) -> Result<Vec<ParsedRow<CowRow>>, DatasetError> {
        let (frame, _) = self.scan(&COW_SCHEMA)?;
        let df = frame.collect().map_err(DatasetError::polars(COWS))?;
        let columns = CowColumns::new(&Frame::new(COWS, &df))?;
        Ok((0..df.height()).map(|idx| columns.decode(idx)).collect())
    }

    pub fn read_sensors(&self) -> Result<Vec<ParsedRow<SensorRow>>, DatasetError> {
        let (frame, _) = self.scan(&SENSOR_SCHEMA)?;
        let df = frame.collect().map_err(DatasetError::polars(SENSORS))?;
        let columns = SensorColumns::new(&Frame::new(SENSORS, &df))?;
        Ok((0..df.height()).map(|idx| columns.decode(idx)).collect())
    }

    pub fn measurements(&self, chunk_size: usize) -> Result<MeasurementSource, DatasetError> {
        let (frame, format) = self.scan(&MEASUREMENT_SCHEMA)?;
        let counted = frame
            .clone()
            .select([len().alias("rows")])
            .collect()
            .map_err(DatasetError::polars(MEASUREMENTS))?;
        let total_rows = counted
            .column("rows")
            .and_then(|column| column.cast(&DataType::UInt64))
            .map_err(DatasetError::polars(MEASUREMENTS))?
            .u64()
            .map_err(DatasetError::polars(MEASUREMENTS))?
            .get(0)
            .unwrap_or(0) as usize;

        Ok(MeasurementSource {
            frame,
            format,
            chunk_size: chunk_size.max(1),
            total_rows,
        })
    }
}

/// The measurement dataset, read lazily. Every call to [`MeasurementSource::rows`]
/// starts a fresh pass from the first row.
#[derive(Clone)]
pub struct MeasurementSource {
    frame: LazyFrame,
    format: DatasetFormat,
    chunk_size: usize,
    total_rows: usize,
}

impl fmt::Debug for MeasurementSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeasurementSource")
            .field("format", &self.format)
            .field("chunk_size", &self.chunk_size)
            .field("total_rows", &self.total_rows)
            .finish()
    }
}

impl MeasurementSource {
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn rows(&self) -> MeasurementRows {
        MeasurementRows {
            frame: self.frame.clone(),
            chunk_size: self.chunk_size,
            total_rows: self.total_rows,
            offset: 0,
            buffer: Vec::new().into_iter(),
            exhausted: false,
        }
    }
}

/// Iterator over measurement rows. Yields `Err` once if a chunk cannot be
/// read, then stops.
pub struct MeasurementRows {
    frame: LazyFrame,
    chunk_size: usize,
    total_rows: usize,
    offset: usize,
    buffer: std::vec::IntoIter<ParsedRow<MeasurementRow>>,
    exhausted: bool,
}

impl MeasurementRows {
    fn load_chunk(&mut self) -> Result<Vec<ParsedRow<MeasurementRow>>, DatasetError> {
        let len = IdxSize::try_from(self.chunk_size).unwrap_or(IdxSize::MAX);
        let df = self
            .frame
            .clone()
            .slice(self.offset as i64, len)
            .collect()
            .map_err(DatasetError::polars(MEASUREMENTS))?;

        let columns = MeasurementColumns::new(&Frame::new(MEASUREMENTS, &df), self.offset)?;
        let rows = (0..df.height()).map(|idx| columns.decode(idx)).collect();

        debug!(offset = self.offset, rows = df.height(), "Loaded measurement chunk");
        if df.height() == 0 {
            self.exhausted = true;
        }
        self.offset += df.height();
        Ok(rows)
    }
}

impl Iterator for MeasurementRows {
    type Item = Result<ParsedRow<MeasurementRow>, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(Ok(row));
            }
            if self.exhausted || self.offset >= self.total_rows {
                return None;
            }
            match self.load_chunk() {
                Ok(rows) => self.buffer = rows.into_iter(),
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

struct CowColumns {
    ids: TextColumn,
    names: TextColumn,
    birthdates: TextColumn,
    breeds: Option<TextColumn>,
}

impl CowColumns {
    fn new(frame: &Frame<'_>) -> Result<Self, DatasetError> {
        Ok(Self {
            ids: frame.text("id")?,
            names: frame.text("name")?,
            birthdates: frame.text("birthdate")?,
            breeds: frame.optional_text("breed")?,
        })
    }

    fn decode(&self, idx: usize) -> ParsedRow<CowRow> {
        let record = self.decode_record(idx);
        ParsedRow { index: idx, record }
    }

    fn decode_record(&self, idx: usize) -> Result<CowRow, RowError> {
        let id = required_uuid(COWS, idx, &self.ids, idx)?;
        let name = required(COWS, idx, &self.names, idx)?.to_string();
        let birthdate = self
            .birthdates
            .date(idx)
            .ok_or_else(|| missing(COWS, idx, self.birthdates.name))?
            .map_err(|cell| invalid(COWS, idx, self.birthdates.name, cell))?;
        let breed = self
            .breeds
            .as_ref()
            .and_then(|column| column.get(idx))
            .map(str::to_string);

        Ok(CowRow {
            id,
            name,
            breed,
            birthdate,
        })
    }
}

struct SensorColumns {
    ids: TextColumn,
    units: TextColumn,
    kinds: Option<TextColumn>,
    cow_ids: Option<TextColumn>,
}

impl SensorColumns {
    fn new(frame: &Frame<'_>) -> Result<Self, DatasetError> {
        Ok(Self {
            ids: frame.text("id")?,
            units: frame.text("unit")?,
            kinds: frame.optional_text("kind")?,
            cow_ids: frame.optional_text("cow_id")?,
        })
    }

    fn decode(&self, idx: usize) -> ParsedRow<SensorRow> {
        let record = self.decode_record(idx);
        ParsedRow { index: idx, record }
    }

    fn decode_record(&self, idx: usize) -> Result<SensorRow, RowError> {
        let id = required_uuid(SENSORS, idx, &self.ids, idx)?;
        let unit = required(SENSORS, idx, &self.units, idx)?.to_string();
        let kind = self
            .kinds
            .as_ref()
            .and_then(|column| column.get(idx))
            .map(str::to_string);
        let cow_id = match &self.cow_ids {
            Some(column) => column
                .uuid(idx)
                .transpose()
                .map_err(|cell| invalid(SENSORS, idx, column.name, cell))?,
            None => None,
        };

        Ok(SensorRow {
            id,
            unit,
            kind,
            cow_id,
        })
    }
}

struct MeasurementColumns {
    offset: usize,
    cow_ids: TextColumn,
    sensor_ids: TextColumn,
    timestamps: TimestampColumn,
    values: NumberColumn,
    units: Option<TextColumn>,
}

impl MeasurementColumns {
    fn new(frame: &Frame<'_>, offset: usize) -> Result<Self, DatasetError> {
        Ok(Self {
            offset,
            cow_ids: frame.text("cow_id")?,
            sensor_ids: frame.text("sensor_id")?,
            timestamps: frame.timestamps("timestamp")?,
            values: frame.number("value")?,
            units: frame.optional_text("unit")?,
        })
    }

    fn decode(&self, idx: usize) -> ParsedRow<MeasurementRow> {
        let index = self.offset + idx;
        let record = self.decode_record(idx, index);
        ParsedRow { index, record }
    }

    fn decode_record(&self, idx: usize, row: usize) -> Result<MeasurementRow, RowError> {
        let cow_id = required_uuid(MEASUREMENTS, row, &self.cow_ids, idx)?;
        let sensor_id = required_uuid(MEASUREMENTS, row, &self.sensor_ids, idx)?;
        let timestamp = self
            .timestamps
            .get(idx)
            .ok_or_else(|| missing(MEASUREMENTS, row, "timestamp"))?
            .map_err(|cell| invalid(MEASUREMENTS, row, "timestamp", cell))?;
        let value = self
            .values
            .get(idx)
            .map_err(|cell| invalid(MEASUREMENTS, row, "value", cell))?;
        let unit = self
            .units
            .as_ref()
            .and_then(|column| column.get(idx))
            .map(str::to_string);

        Ok(MeasurementRow {
            cow_id,
            sensor_id,
            timestamp,
            value,
            unit,
        })
    }
}

fn required<'c>(
    dataset: &'static str,
    row: usize,
    column: &'c TextColumn,
    idx: usize,
) -> Result<&'c str, RowError> {
    column.get(idx).ok_or_else(|| missing(dataset, row, column.name))
}

fn required_uuid(
    dataset: &'static str,
    row: usize,
    column: &TextColumn,
    idx: usize,
) -> Result<Uuid, RowError> {
    column
        .uuid(idx)
        .ok_or_else(|| missing(dataset, row, column.name))?
        .map_err(|cell| invalid(dataset, row, column.name, cell))
}

fn missing(dataset: &'static str, row: usize, column: &'static str) -> RowError {
    RowError::Missing {
        dataset,
        row,
        column,
    }
}

fn invalid(
    dataset: &'static str,
    row: usize,
    column: &'static str,
    (value, reason): (String, String),
) -> RowError {
    RowError::Invalid {
        dataset,
        row,
        column,
        value,
        reason,
    }
}
