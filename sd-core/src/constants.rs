//! Constants and configuration values for sensord
//!
//! Centralizes magic numbers, paths, and configuration defaults.
//! Add new tunables here rather than inlining them at the use site.

use std::time::Duration;

/// System paths
pub mod paths {
    /// Default sensor configuration file
    pub const SENSOR_CONFIG: &str = "/var/configuration/sensors.json";

    /// Persisted threshold edits made over the bus
    pub const THRESHOLD_STORE: &str = "/var/lib/sensord/thresholds.json";
}

/// Sensor lifecycle parameters
pub mod sensor {
    /// Consecutive failed reads before a sensor is marked non-functional
    pub const ERROR_THRESHOLD: usize = 5;

    /// Default threshold hysteresis as a fraction of the sensor range
    pub const HYSTERESIS_TRIGGER_FACTOR: f64 = 0.01;

    /// Minimum value change, as a fraction of the range, worth republishing
    pub const HYSTERESIS_PUBLISH_FACTOR: f64 = 0.0001;

    /// Maximum thresholds per sensor (4 levels x 2 directions)
    pub const MAX_THRESHOLDS: usize = 8;
}

/// Default reading ranges per measured quantity
pub mod bounds {
    pub const TEMPERATURE_MIN: f64 = -128.0;
    pub const TEMPERATURE_MAX: f64 = 127.0;

    /// Pascals
    pub const PRESSURE_MIN: f64 = 30_000.0;
    pub const PRESSURE_MAX: f64 = 120_000.0;

    pub const VOLTAGE_MIN: f64 = 0.0;
    pub const VOLTAGE_MAX: f64 = 255.0;

    pub const CURRENT_MIN: f64 = 0.0;
    pub const CURRENT_MAX: f64 = 255.0;

    /// CPU package power caps
    pub const POWER_MIN: f64 = 0.0;
    pub const POWER_MAX: f64 = 511.0;

    pub const FAN_MIN: f64 = 0.0;
    pub const FAN_MAX: f64 = 25_000.0;

    pub const PERCENT_MIN: f64 = 0.0;
    pub const PERCENT_MAX: f64 = 100.0;
}

/// Timing parameters
pub mod timing {
    use super::Duration;

    /// Default interval between reads of a healthy sensor
    pub const DEFAULT_POLL: Duration = Duration::from_millis(500);

    /// Back-off interval after a failed or gated read
    pub const FAILED_POLL: Duration = Duration::from_millis(5000);

    /// Lower bound on configured poll rates
    pub const MIN_POLL: Duration = Duration::from_millis(50);

    /// How often external sensors are checked for stale values
    pub const EXTERNAL_TIMEOUT_CHECK: Duration = Duration::from_millis(1000);
}

/// Safety limits
pub mod limits {
    /// Maximum sensor configuration file size (4MB)
    pub const MAX_CONFIG_SIZE: u64 = 4 * 1024 * 1024;

    /// Maximum threshold store file size (1MB)
    pub const MAX_THRESHOLD_STORE_SIZE: u64 = 1024 * 1024;

    /// Maximum sensor name length
    pub const MAX_SENSOR_NAME_LEN: usize = 128;

    /// Capacity of the broadcast channel carrying bus events
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
}
