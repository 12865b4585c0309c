use comfy_table::{presets::UTF8_FULL, Table};
use serde::Serialize;

use super::requests::Dataset;

/// Per-dataset tallies. `total` counts input rows; every row lands in exactly
/// one of the other four buckets once a run completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetCounts {
    pub total: usize,
    pub submitted: usize,
    pub duplicate: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl DatasetCounts {
    pub fn processed(&self) -> usize {
        self.submitted + self.duplicate + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub dry_run: bool,
    pub cows: DatasetCounts,
    pub sensors: DatasetCounts,
    pub measurements: DatasetCounts,
}

impl IngestSummary {
    pub fn counts(&self, dataset: Dataset) -> &DatasetCounts {
        match dataset {
            Dataset::Cows => &self.cows,
            Dataset::Sensors => &self.sensors,
            Dataset::Measurements => &self.measurements,
        }
    }

    pub(crate) fn counts_mut(&mut self, dataset: Dataset) -> &mut DatasetCounts {
        match dataset {
            Dataset::Cows => &mut self.cows,
            Dataset::Sensors => &mut self.sensors,
            Dataset::Measurements => &mut self.measurements,
        }
    }

    pub fn failed(&self) -> usize {
        self.cows.failed + self.sensors.failed + self.measurements.failed
    }

    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL).set_header(vec![
            "dataset",
            "rows",
            "submitted",
            "duplicate",
            "failed",
            "skipped",
        ]);
        for dataset in [Dataset::Cows, Dataset::Sensors, Dataset::Measurements] {
            let counts = self.counts(dataset);
            table.add_row(vec![
                dataset.to_string(),
                counts.total.to_string(),
                counts.submitted.to_string(),
                counts.duplicate.to_string(),
                counts.failed.to_string(),
                counts.skipped.to_string(),
            ]);
        }
        table.to_string()
    }
}
