//! Readers for the three bulk-load datasets (`cows`, `sensors`, `measurements`).
//!
//! Each dataset lives in a directory as `<name>.parquet` or `<name>.csv`. The two
//! dimension datasets are read eagerly; measurements are exposed as a lazy,
//! restartable sequence of rows read in fixed-size chunks.

pub mod directory;
pub mod errors;
pub mod formats;
pub mod model;

pub use directory::{DatasetDirectory, MeasurementRows, MeasurementSource};
pub use errors::{DatasetError, RowError};
pub use formats::DatasetFormat;
pub use model::{CowRow, MeasurementRow, ParsedRow, SensorRow};
