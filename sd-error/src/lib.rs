//! Unified error handling for sensord
//!
//! This crate provides a single error type used across all sensord components.
//! It uses thiserror for ergonomic error definitions with proper Display and Error trait impls.

use std::io;
use std::path::PathBuf;

/// Result type alias using SensorError
pub type Result<T> = std::result::Result<T, SensorError>;

/// Unified error type for all sensord operations
#[derive(thiserror::Error, Debug)]
pub enum SensorError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    // ============================================================================
    // Reading Errors
    // ============================================================================
    #[error("Failed to read sensor {sensor}: {reason}")]
    Read {
        sensor: String,
        reason: String,
    },

    #[error("Malformed reading from {path}: {content:?}")]
    MalformedReading {
        path: PathBuf,
        content: String,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    #[error("Invalid threshold {name}: {reason}")]
    InvalidThreshold {
        name: String,
        reason: String,
    },

    #[error("Units not in allow list: {0}")]
    UnitsNotAllowed(String),

    #[error("Invalid sensor name: {0}")]
    InvalidSensorName(String),

    // ============================================================================
    // Access and Bus Errors
    // ============================================================================
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Publish failed for {path}: {reason}")]
    Publish {
        path: String,
        reason: String,
    },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Generic(String),
}

impl SensorError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid config error for a named field
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid threshold error
    pub fn invalid_threshold(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidThreshold {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a read error for a sensor
    pub fn read(sensor: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            sensor: sensor.into(),
            reason: reason.into(),
        }
    }

    /// True for errors raised while validating a sensor definition
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidConfig { .. }
                | Self::InvalidThreshold { .. }
                | Self::UnitsNotAllowed(_)
                | Self::InvalidSensorName(_)
                | Self::JsonParse(_)
        )
    }
}

// Allow converting from String to SensorError
impl From<String> for SensorError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to SensorError
impl From<&str> for SensorError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_classification() {
        assert!(SensorError::invalid_threshold("WarningHigh", "NaN").is_config_error());
        assert!(SensorError::UnitsNotAllowed("Furlongs".into()).is_config_error());
        assert!(!SensorError::PermissionDenied("Value".into()).is_config_error());
        assert!(!SensorError::read("cpu0", "EIO").is_config_error());
    }

    #[test]
    fn test_display() {
        let err = SensorError::invalid_config("MaxReading", "must exceed MinReading");
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for MaxReading: must exceed MinReading"
        );
    }
}
