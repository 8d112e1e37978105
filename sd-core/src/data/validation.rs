//! Input validation for sensor definitions and on-disk files
//!
//! Everything here runs before a sensor is registered, so a bad definition
//! never leaves a half-published object behind.

use std::path::Path;

use sd_protocol::path_for_units;

use crate::constants::limits;
use crate::error::{Result, SensorError};

/// Validate a sensor name as given in configuration
pub fn validate_sensor_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SensorError::InvalidSensorName("name cannot be empty".into()));
    }

    if name.len() > limits::MAX_SENSOR_NAME_LEN {
        return Err(SensorError::InvalidSensorName(format!(
            "'{}' exceeds maximum length of {} characters",
            name,
            limits::MAX_SENSOR_NAME_LEN
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(SensorError::InvalidSensorName(format!(
            "'{}' contains control characters",
            name.escape_default()
        )));
    }

    Ok(())
}

/// Map units to their object path segment, rejecting anything not allowed
pub fn validate_units(units: &str) -> Result<&'static str> {
    path_for_units(units).ok_or_else(|| SensorError::UnitsNotAllowed(units.to_string()))
}

/// Reading range must be finite and non-empty
pub fn validate_bounds(min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() {
        return Err(SensorError::invalid_config(
            "MinReading/MaxReading",
            "bounds must be finite",
        ));
    }
    if min >= max {
        return Err(SensorError::invalid_config(
            "MinReading/MaxReading",
            format!("min {} must be below max {}", min, max),
        ));
    }
    Ok(())
}

/// Reject files larger than `max_size` before reading them into memory
pub fn validate_file_size(path: &Path, max_size: u64) -> Result<()> {
    let metadata = std::fs::metadata(path).map_err(|e| SensorError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > max_size {
        return Err(SensorError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size,
        });
    }

    Ok(())
}
