//! Configuration, validation and threshold persistence

mod config;
mod persistence;
mod validation;

pub use config::{
    default_limits, load_sensor_configs, SensorConfig, ThresholdConfig, EXTERNAL_SENSOR_TYPE,
};
#[cfg(test)]
pub use persistence::MockThresholdStore;
pub use persistence::{
    load_threshold_overrides, save_threshold_overrides, JsonThresholdStore, PersistedThreshold,
    ThresholdOverrides, ThresholdStore,
};
pub use validation::{validate_bounds, validate_file_size, validate_sensor_name, validate_units};
