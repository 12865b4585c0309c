pub const COWS: &str = "cows";
pub const SENSORS: &str = "sensors";
pub const MEASUREMENTS: &str = "measurements";

#[derive(Debug, Clone, Copy)]
pub struct DatasetSchema {
    pub name: &'static str,
    pub required: &'static [&'static str],
}

pub const COW_SCHEMA: DatasetSchema = DatasetSchema {
    name: COWS,
    required: &["id", "name", "birthdate"],
};

pub const SENSOR_SCHEMA: DatasetSchema = DatasetSchema {
    name: SENSORS,
    required: &["id", "unit"],
};

pub const MEASUREMENT_SCHEMA: DatasetSchema = DatasetSchema {
    name: MEASUREMENTS,
    required: &["cow_id", "sensor_id", "timestamp", "value"],
};
