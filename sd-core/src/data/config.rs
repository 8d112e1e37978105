//! Sensor configuration records
//!
//! The configuration file is a JSON object mapping configuration paths to
//! sensor records in entity-manager style:
//!
//! ```json
//! {
//!   "/xyz/openbmc_project/inventory/system/board/Board/Inlet_Temp": {
//!     "Name": "Inlet Temp",
//!     "Type": "TMP75",
//!     "Path": "/sys/class/hwmon/hwmon0/temp1_input",
//!     "Scale": 0.001,
//!     "Thresholds": [
//!       { "Severity": 0, "Direction": "greater than", "Value": 80.0, "Hysteresis": 2.0 }
//!     ]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use sd_protocol::{Direction, Level};

use crate::constants::{bounds, limits, timing};
use crate::data::validation::validate_file_size;
use crate::engine::{PowerState, SensorDefinition, Threshold};
use crate::error::{Result, SensorError};
use crate::hw::units_for_hwmon_type;

/// Object type of sensors fed purely by external writes
pub const EXTERNAL_SENSOR_TYPE: &str = "ExternalSensor";

fn default_type() -> String {
    "Hwmon".to_string()
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ThresholdConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub severity: u64,
    pub direction: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hysteresis: Option<f64>,
}

impl ThresholdConfig {
    pub fn to_threshold(&self) -> Result<Threshold> {
        let label = self.name.as_deref().unwrap_or("threshold");
        let level = Level::from_severity(self.severity).ok_or_else(|| {
            SensorError::invalid_threshold(label, format!("unknown severity {}", self.severity))
        })?;
        let direction = Direction::from_config_str(&self.direction).ok_or_else(|| {
            SensorError::invalid_threshold(label, format!("unknown direction '{}'", self.direction))
        })?;

        let threshold = Threshold::new(level, direction, self.value);
        Ok(match self.hysteresis {
            Some(h) => threshold.with_hysteresis(h),
            None => threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorConfig {
    pub name: String,
    #[serde(rename = "Type", default = "default_type")]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_reading: Option<f64>,
    #[serde(default)]
    pub thresholds: Vec<ThresholdConfig>,
    #[serde(default)]
    pub mutable: bool,
    #[serde(default)]
    pub settable: bool,
    #[serde(default)]
    pub power_state: PowerState,
    /// Seconds between reads
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_rate: Option<f64>,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Seconds an external value stays valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_threshold: Option<usize>,
    #[serde(default)]
    pub instrumentation: bool,
}

impl SensorConfig {
    pub fn is_external(&self) -> bool {
        self.object_type == EXTERNAL_SENSOR_TYPE
    }

    /// Explicit `Units`, else inferred from the hwmon file name in `Path`
    pub fn resolved_units(&self) -> Option<String> {
        if let Some(units) = &self.units {
            return Some(units.clone());
        }
        let file_name = Path::new(self.path.as_ref()?).file_name()?.to_str()?;
        units_for_hwmon_type(file_name).map(str::to_string)
    }

    /// Configured bounds, falling back to the defaults for the units
    pub fn limits(&self, units: &str) -> (f64, f64) {
        let (min, max) = default_limits(units);
        (self.min_reading.unwrap_or(min), self.max_reading.unwrap_or(max))
    }

    pub fn poll_interval(&self) -> Duration {
        match self.poll_rate {
            Some(secs) if secs.is_finite() && secs > 0.0 && secs < 86_400.0 => {
                Duration::from_secs_f64(secs).max(timing::MIN_POLL)
            }
            _ => timing::DEFAULT_POLL,
        }
    }

    /// Perishability window for external sensors; `None` means values never go stale
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout {
            Some(secs) if secs.is_finite() && secs > 0.0 && secs < 86_400.0 => {
                Some(Duration::from_secs_f64(secs))
            }
            _ => None,
        }
    }

    pub fn to_definition(&self, configuration_path: &str) -> Result<SensorDefinition> {
        let units = self.resolved_units().ok_or_else(|| {
            SensorError::invalid_config("Units", format!("cannot determine units for {}", self.name))
        })?;
        let (min, max) = self.limits(&units);

        let thresholds = self
            .thresholds
            .iter()
            .map(ThresholdConfig::to_threshold)
            .collect::<Result<Vec<_>>>()?;

        let mut definition =
            SensorDefinition::new(&self.name, configuration_path, &self.object_type, units, min, max)
                .with_thresholds(thresholds)
                .with_power_state(self.power_state)
                .mutable(self.mutable || self.is_external())
                .settable(self.settable || self.is_external());
        definition.error_threshold = self.error_threshold;
        definition.instrumentation = self.instrumentation;
        Ok(definition)
    }
}

/// Default reading range for a unit
pub fn default_limits(units: &str) -> (f64, f64) {
    match units {
        "DegreesC" => (bounds::TEMPERATURE_MIN, bounds::TEMPERATURE_MAX),
        "Volts" => (bounds::VOLTAGE_MIN, bounds::VOLTAGE_MAX),
        "Amperes" => (bounds::CURRENT_MIN, bounds::CURRENT_MAX),
        "Watts" => (bounds::POWER_MIN, bounds::POWER_MAX),
        "RPMS" => (bounds::FAN_MIN, bounds::FAN_MAX),
        "Percent" => (bounds::PERCENT_MIN, bounds::PERCENT_MAX),
        "Pascals" => (bounds::PRESSURE_MIN, bounds::PRESSURE_MAX),
        _ => (0.0, 255.0),
    }
}

/// Load every sensor record, keyed by configuration path
pub fn load_sensor_configs(path: &Path) -> Result<BTreeMap<String, SensorConfig>> {
    validate_file_size(path, limits::MAX_CONFIG_SIZE)?;

    let contents = fs::read_to_string(path).map_err(|e| SensorError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let configs: BTreeMap<String, SensorConfig> = serde_json::from_str(&contents)?;

    info!("Loaded {} sensor configurations from {:?}", configs.len(), path);
    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "/inv/board/Inlet_Temp": {
            "Name": "Inlet Temp",
            "Type": "TMP75",
            "Path": "/sys/class/hwmon/hwmon0/temp1_input",
            "Scale": 0.001,
            "PowerState": "On",
            "PollRate": 1.5,
            "Thresholds": [
                { "Name": "upper non critical", "Severity": 0, "Direction": "greater than", "Value": 80.0, "Hysteresis": 2.0 },
                { "Severity": 1, "Direction": "less than", "Value": 5.0 }
            ]
        },
        "/inv/board/Ambient": {
            "Name": "Ambient",
            "Type": "ExternalSensor",
            "Units": "DegreesC",
            "MinReading": -40,
            "MaxReading": 85,
            "Timeout": 4
        }
    }"#;

    fn sample() -> BTreeMap<String, SensorConfig> {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_and_defaults() {
        let configs = sample();
        let inlet = &configs["/inv/board/Inlet_Temp"];
        assert_eq!(inlet.power_state, PowerState::On);
        assert_eq!(inlet.offset, 0.0);
        assert_eq!(inlet.scale, 0.001);
        assert_eq!(inlet.poll_interval(), Duration::from_millis(1500));
        assert_eq!(inlet.resolved_units().as_deref(), Some("DegreesC"));
        assert!(!inlet.is_external());

        let ambient = &configs["/inv/board/Ambient"];
        assert!(ambient.is_external());
        assert_eq!(ambient.scale, 1.0);
        assert_eq!(ambient.timeout(), Some(Duration::from_secs(4)));
        assert_eq!(ambient.poll_interval(), timing::DEFAULT_POLL);
    }

    #[test]
    fn test_to_definition() {
        let configs = sample();
        let def = configs["/inv/board/Inlet_Temp"]
            .to_definition("/inv/board/Inlet_Temp")
            .unwrap();
        assert_eq!(def.units, "DegreesC");
        assert_eq!((def.min_value, def.max_value), (-128.0, 127.0));
        assert_eq!(def.thresholds.len(), 2);
        assert_eq!(def.thresholds[0].level, Level::Warning);
        assert_eq!(def.thresholds[1].direction, Direction::Low);
        assert!(def.thresholds[1].hysteresis.is_nan());
        assert!(!def.settable);

        let ext = configs["/inv/board/Ambient"].to_definition("/inv/board/Ambient").unwrap();
        assert_eq!((ext.min_value, ext.max_value), (-40.0, 85.0));
        assert!(ext.settable && ext.mutable);
    }

    #[test]
    fn test_bad_threshold_rejected() {
        let bad = ThresholdConfig {
            name: None,
            severity: 7,
            direction: "greater than".into(),
            value: 1.0,
            hysteresis: None,
        };
        assert!(bad.to_threshold().is_err());

        let bad = ThresholdConfig { severity: 0, direction: "sideways".into(), ..bad };
        assert!(bad.to_threshold().is_err());
    }

    #[test]
    fn test_missing_units_rejected() {
        let cfg: SensorConfig = serde_json::from_str(r#"{ "Name": "x" }"#).unwrap();
        assert!(cfg.to_definition("/inv/x").is_err());
    }

    #[test]
    fn test_out_of_range_poll_rate_uses_default() {
        let mut cfg: SensorConfig = serde_json::from_str(r#"{ "Name": "x", "PollRate": -1 }"#).unwrap();
        assert_eq!(cfg.poll_interval(), timing::DEFAULT_POLL);
        cfg.poll_rate = Some(0.001);
        assert_eq!(cfg.poll_interval(), timing::MIN_POLL);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(load_sensor_configs(&path).unwrap().len(), 2);

        assert!(load_sensor_configs(&dir.path().join("missing.json")).is_err());
    }
}
