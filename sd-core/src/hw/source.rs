//! Reading sources
//!
//! A source performs one blocking read and converts it to engineering
//! units. Sources run on the blocking pool, never on the event loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::data::SensorConfig;
use crate::error::{Result, SensorError};

/// One decoded reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Value as read from the device, before offset and scale
    pub raw: f64,
    /// Value in the sensor's units
    pub value: f64,
}

pub trait ReadingSource: Send + 'static {
    /// Perform one blocking read
    fn read(&mut self) -> Result<Reading>;

    /// Short label for logs
    fn describe(&self) -> String;
}

/// Reads a sysfs hwmon attribute: `value = (raw + offset) * scale`
#[derive(Debug, Clone)]
pub struct HwmonFileSource {
    path: PathBuf,
    offset: f64,
    scale: f64,
}

impl HwmonFileSource {
    pub fn new(path: impl Into<PathBuf>, offset: f64, scale: f64) -> Self {
        Self {
            path: path.into(),
            offset,
            scale,
        }
    }

    /// Build from configuration. The path must point into sysfs.
    pub fn from_config(config: &SensorConfig) -> Result<Self> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| SensorError::invalid_config("Path", "hwmon sensor needs a Path"))?;
        sd_protocol::validate_hwmon_path(path).map_err(|reason| SensorError::invalid_config("Path", reason))?;
        if !config.scale.is_finite() || config.scale == 0.0 {
            return Err(SensorError::invalid_config("Scale", "must be finite and non-zero"));
        }
        if !config.offset.is_finite() {
            return Err(SensorError::invalid_config("Offset", "must be finite"));
        }
        Ok(Self::new(path, config.offset, config.scale))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReadingSource for HwmonFileSource {
    fn read(&mut self) -> Result<Reading> {
        let content = fs::read_to_string(&self.path).map_err(|e| SensorError::FileRead {
            path: self.path.clone(),
            source: e,
        })?;

        let raw = content
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| SensorError::MalformedReading {
                path: self.path.clone(),
                content: content.trim().to_string(),
            })?;

        Ok(Reading {
            raw,
            value: (raw + self.offset) * self.scale,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn hwmon_file_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([a-z]+)(\d+)_([a-z_]+)$").ok())
        .as_ref()
}

/// Split `temp1_input` into `("temp", 1, "input")`
pub fn split_file_name(file_name: &str) -> Option<(&str, u32, &str)> {
    let caps = hwmon_file_regex()?.captures(file_name)?;
    let kind = caps.get(1)?.as_str();
    let index = caps.get(2)?.as_str().parse().ok()?;
    let item = caps.get(3)?.as_str();
    Some((kind, index, item))
}

/// Units of an hwmon attribute, from its file name
pub fn units_for_hwmon_type(file_name: &str) -> Option<&'static str> {
    let (kind, _, _) = split_file_name(file_name)?;
    match kind {
        "temp" => Some("DegreesC"),
        "in" => Some("Volts"),
        "curr" => Some("Amperes"),
        "power" => Some("Watts"),
        "fan" => Some("RPMS"),
        "humidity" => Some("Percent"),
        "pressure" => Some("Pascals"),
        "energy" => Some("Joules"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_file_name() {
        assert_eq!(split_file_name("temp1_input"), Some(("temp", 1, "input")));
        assert_eq!(split_file_name("in12_crit_alarm"), Some(("in", 12, "crit_alarm")));
        assert_eq!(split_file_name("name"), None);
        assert_eq!(split_file_name("temp_input"), None);
    }

    #[test]
    fn test_units_for_hwmon_type() {
        assert_eq!(units_for_hwmon_type("temp3_input"), Some("DegreesC"));
        assert_eq!(units_for_hwmon_type("in0_input"), Some("Volts"));
        assert_eq!(units_for_hwmon_type("fan2_input"), Some("RPMS"));
        assert_eq!(units_for_hwmon_type("pwm1_enable"), None);
    }

    #[test]
    fn test_file_source_scales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temp1_input");
        fs::write(&path, "45000\n").unwrap();

        let mut source = HwmonFileSource::new(&path, 0.0, 0.001);
        let reading = source.read().unwrap();
        assert_eq!(reading.raw, 45000.0);
        assert!((reading.value - 45.0).abs() < 1e-9);

        let mut source = HwmonFileSource::new(&path, -5000.0, 0.001);
        assert!((source.read().unwrap().value - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_file_source_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in1_input");

        let mut source = HwmonFileSource::new(&path, 0.0, 1.0);
        assert!(matches!(source.read(), Err(SensorError::FileRead { .. })));

        fs::write(&path, "garbage").unwrap();
        assert!(matches!(source.read(), Err(SensorError::MalformedReading { .. })));
    }

    #[test]
    fn test_from_config_validates_path() {
        let mut config: SensorConfig = serde_json::from_str(
            r#"{ "Name": "x", "Path": "/sys/class/hwmon/hwmon0/temp1_input", "Scale": 0.001 }"#,
        )
        .unwrap();
        assert!(HwmonFileSource::from_config(&config).is_ok());

        config.path = Some("/etc/shadow".into());
        assert!(HwmonFileSource::from_config(&config).is_err());

        config.path = None;
        assert!(HwmonFileSource::from_config(&config).is_err());
    }
}
