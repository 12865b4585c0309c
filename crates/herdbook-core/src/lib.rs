pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod maintenance;
pub mod reports;
pub mod store;
pub mod types;
pub mod validation;

pub use herdbook_datasets as datasets;
