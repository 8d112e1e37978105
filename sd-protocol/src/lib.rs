use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global event sequence counter for ordering across sensors
static EVENT_SEQ_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Root of every sensor object path
pub const SENSOR_PATH_PREFIX: &str = "/xyz/openbmc_project/sensors/";

/// Root of inventory object paths
pub const INVENTORY_PATH: &str = "/xyz/openbmc_project/inventory";

/// Maximum path length for security validation
const MAX_PATH_LENGTH: usize = 256;

const ALLOWED_PATH_PREFIXES: &[&str] = &["/sys/class/hwmon/", "/sys/devices/", "/sys/bus/"];

const FORBIDDEN_PATH_COMPONENTS: &[&str] = &[
    "..",      // Path traversal
    "//",      // Double slash (path normalization bypass)
    "\0",      // Null byte injection
    "\n",      // Newline injection
    "\r",      // Carriage return injection
];

pub mod interfaces {
    pub const VALUE: &str = "xyz.openbmc_project.Sensor.Value";
    pub const VALUE_MUTABILITY: &str = "xyz.openbmc_project.Sensor.ValueMutability";
    pub const AVAILABILITY: &str = "xyz.openbmc_project.State.Decorator.Availability";
    pub const OPERATIONAL_STATUS: &str = "xyz.openbmc_project.State.Decorator.OperationalStatus";
    pub const ASSOCIATION: &str = "xyz.openbmc_project.Association.Definitions";
    pub const THRESHOLD_WARNING: &str = "xyz.openbmc_project.Sensor.Threshold.Warning";
    pub const THRESHOLD_CRITICAL: &str = "xyz.openbmc_project.Sensor.Threshold.Critical";
    pub const THRESHOLD_SOFT_SHUTDOWN: &str = "xyz.openbmc_project.Sensor.Threshold.SoftShutdown";
    pub const THRESHOLD_HARD_SHUTDOWN: &str = "xyz.openbmc_project.Sensor.Threshold.HardShutdown";
}

/// Generate the next event sequence number
pub fn next_event_seq() -> u64 {
    EVENT_SEQ_COUNTER.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// Threshold vocabulary
// ============================================================================

/// Threshold severity, ordered Warning < Critical < SoftShutdown < HardShutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Warning,
    Critical,
    SoftShutdown,
    HardShutdown,
}

impl Level {
    pub const ALL: [Level; 4] = [
        Level::Warning,
        Level::Critical,
        Level::SoftShutdown,
        Level::HardShutdown,
    ];

    /// Map an entity-manager `Severity` number to a level
    pub fn from_severity(severity: u64) -> Option<Level> {
        match severity {
            0 => Some(Level::Warning),
            1 => Some(Level::Critical),
            2 => Some(Level::SoftShutdown),
            3 => Some(Level::HardShutdown),
            _ => None,
        }
    }

    pub fn severity(self) -> u8 {
        self as u8
    }

    pub fn interface(self) -> &'static str {
        match self {
            Level::Warning => interfaces::THRESHOLD_WARNING,
            Level::Critical => interfaces::THRESHOLD_CRITICAL,
            Level::SoftShutdown => interfaces::THRESHOLD_SOFT_SHUTDOWN,
            Level::HardShutdown => interfaces::THRESHOLD_HARD_SHUTDOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    /// Parse the configuration spelling ("greater than" / "less than")
    pub fn from_config_str(s: &str) -> Option<Direction> {
        match s {
            "greater than" => Some(Direction::High),
            "less than" => Some(Direction::Low),
            _ => None,
        }
    }

    pub fn as_config_str(self) -> &'static str {
        match self {
            Direction::High => "greater than",
            Direction::Low => "less than",
        }
    }
}

/// One row of the threshold property table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdProperty {
    pub level: Level,
    pub direction: Direction,
    pub severity_order: u8,
    pub level_property: &'static str,
    pub alarm_property: &'static str,
}

pub const THRESHOLD_PROPERTIES: [ThresholdProperty; 8] = [
    ThresholdProperty {
        level: Level::Warning,
        direction: Direction::High,
        severity_order: 0,
        level_property: "WarningHigh",
        alarm_property: "WarningAlarmHigh",
    },
    ThresholdProperty {
        level: Level::Warning,
        direction: Direction::Low,
        severity_order: 0,
        level_property: "WarningLow",
        alarm_property: "WarningAlarmLow",
    },
    ThresholdProperty {
        level: Level::Critical,
        direction: Direction::High,
        severity_order: 1,
        level_property: "CriticalHigh",
        alarm_property: "CriticalAlarmHigh",
    },
    ThresholdProperty {
        level: Level::Critical,
        direction: Direction::Low,
        severity_order: 1,
        level_property: "CriticalLow",
        alarm_property: "CriticalAlarmLow",
    },
    ThresholdProperty {
        level: Level::SoftShutdown,
        direction: Direction::High,
        severity_order: 2,
        level_property: "SoftShutdownHigh",
        alarm_property: "SoftShutdownAlarmHigh",
    },
    ThresholdProperty {
        level: Level::SoftShutdown,
        direction: Direction::Low,
        severity_order: 2,
        level_property: "SoftShutdownLow",
        alarm_property: "SoftShutdownAlarmLow",
    },
    ThresholdProperty {
        level: Level::HardShutdown,
        direction: Direction::High,
        severity_order: 3,
        level_property: "HardShutdownHigh",
        alarm_property: "HardShutdownAlarmHigh",
    },
    ThresholdProperty {
        level: Level::HardShutdown,
        direction: Direction::Low,
        severity_order: 3,
        level_property: "HardShutdownLow",
        alarm_property: "HardShutdownAlarmLow",
    },
];

pub fn threshold_property(level: Level, direction: Direction) -> &'static ThresholdProperty {
    // The table covers every (level, direction) pair
    let index = (level.severity() as usize) * 2 + usize::from(direction == Direction::Low);
    &THRESHOLD_PROPERTIES[index]
}

/// Find a table row by its trigger property name (e.g. "CriticalLow")
pub fn threshold_property_by_name(name: &str) -> Option<&'static ThresholdProperty> {
    THRESHOLD_PROPERTIES.iter().find(|p| p.level_property == name)
}

// ============================================================================
// Object paths and units
// ============================================================================

/// Units accepted on the bus and the object path segment they publish under
const UNIT_PATHS: &[(&str, &str)] = &[
    ("DegreesC", "temperature"),
    ("Volts", "voltage"),
    ("Amperes", "current"),
    ("Watts", "power"),
    ("RPMS", "fan_tach"),
    ("Percent", "utilization"),
    ("Pascals", "pressure"),
    ("CFM", "airflow"),
    ("Joules", "energy"),
];

/// Object path segment for a unit, `None` if the unit is not allowed
pub fn path_for_units(units: &str) -> Option<&'static str> {
    UNIT_PATHS
        .iter()
        .find(|(u, _)| *u == units)
        .map(|(_, p)| *p)
}

/// Unit string for an object path segment (reverse of `path_for_units`)
pub fn units_for_path(segment: &str) -> Option<&'static str> {
    UNIT_PATHS
        .iter()
        .find(|(_, p)| *p == segment)
        .map(|(u, _)| *u)
}

/// Replace every character outside `[A-Za-z0-9_]` so the name is a legal path element
pub fn escape_path_for_bus(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Build `/xyz/openbmc_project/sensors/<segment>/<escaped name>`
pub fn sensor_object_path(segment: &str, name: &str) -> String {
    format!("{}{}/{}", SENSOR_PATH_PREFIX, segment, escape_path_for_bus(name))
}

// ============================================================================
// Published properties
// ============================================================================

/// Inventory association tuple: (forward, reverse, endpoint)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub forward: String,
    pub reverse: String,
    pub endpoint: String,
}

impl Association {
    /// Association from a sensor to the inventory item owning its configuration
    pub fn inventory(configuration_path: &str) -> Self {
        let endpoint = match configuration_path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => configuration_path[..idx].to_string(),
            None => String::new(),
        };
        Self {
            forward: "inventory".to_string(),
            reverse: "sensors".to_string(),
            endpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSnapshot {
    pub level: Level,
    pub direction: Direction,
    pub value: f64,
    pub alarm: bool,
}

/// Full property surface of a sensor object at registration time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProperties {
    pub unit: String,
    pub value: f64,
    pub max_value: f64,
    pub min_value: f64,
    pub thresholds: Vec<ThresholdSnapshot>,
    pub available: bool,
    pub functional: bool,
    /// Present only when the value is externally settable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub association: Option<Association>,
}

/// A single property change on a sensor object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "property", content = "value")]
pub enum Property {
    Value(f64),
    MaxValue(f64),
    MinValue(f64),
    /// Threshold trigger value, keyed by table name (e.g. "WarningHigh")
    Threshold { name: String, value: f64 },
    /// Alarm edge, keyed by table name (e.g. "WarningAlarmHigh")
    Alarm { name: String, asserted: bool },
    Available(bool),
    Functional(bool),
}

impl Property {
    pub fn name(&self) -> &str {
        match self {
            Property::Value(_) => "Value",
            Property::MaxValue(_) => "MaxValue",
            Property::MinValue(_) => "MinValue",
            Property::Threshold { name, .. } => name,
            Property::Alarm { name, .. } => name,
            Property::Available(_) => "Available",
            Property::Functional(_) => "Functional",
        }
    }

    pub fn interface(&self) -> &'static str {
        match self {
            Property::Value(_) | Property::MaxValue(_) | Property::MinValue(_) => interfaces::VALUE,
            Property::Threshold { name, .. } => threshold_property_by_name(name)
                .map(|p| p.level.interface())
                .unwrap_or(interfaces::VALUE),
            Property::Alarm { name, .. } => THRESHOLD_PROPERTIES
                .iter()
                .find(|p| p.alarm_property == name)
                .map(|p| p.level.interface())
                .unwrap_or(interfaces::VALUE),
            Property::Available(_) => interfaces::AVAILABILITY,
            Property::Functional(_) => interfaces::OPERATIONAL_STATUS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum BusEvent {
    Registered { path: String, properties: SensorProperties },
    PropertyChanged { path: String, property: Property },
    Removed { path: String },
}

/// Event with a global sequence number for correlation in logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: u64,
    #[serde(flatten)]
    pub event: BusEvent,
}

impl EventEnvelope {
    pub fn new(event: BusEvent) -> Self {
        Self {
            seq: next_event_seq(),
            event,
        }
    }
}

// ============================================================================
// Path validation
// ============================================================================

/// Validate a sysfs input path before a sensor opens it
pub fn validate_hwmon_path(path: &str) -> Result<(), String> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(format!(
            "Path too long: {} > {} chars",
            path.len(),
            MAX_PATH_LENGTH
        ));
    }

    if path.is_empty() {
        return Err("Path cannot be empty".into());
    }

    if !path.starts_with('/') {
        return Err("Path must be absolute".into());
    }

    let allowed = ALLOWED_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix));
    if !allowed {
        return Err(format!("Path must be under one of: {:?}", ALLOWED_PATH_PREFIXES));
    }

    for forbidden in FORBIDDEN_PATH_COMPONENTS {
        if path.contains(forbidden) {
            return Err(format!("Path contains forbidden sequence: {:?}", forbidden));
        }
    }

    for c in path.chars() {
        if !c.is_ascii_alphanumeric() && c != '/' && c != '-' && c != '_' && c != '.' && c != ':' {
            return Err(format!("Path contains invalid character: {:?}", c));
        }
    }

    Ok(())
}
