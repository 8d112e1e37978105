//! sensord core library
//!
//! The generic sensor lifecycle and threshold-alarm engine shared by every
//! sensor type of a BMC sensor daemon.
//!
//! # Module Structure
//!
//! - `engine/` - value filtering, thresholds, health tracking, [`SensorCore`]
//! - `data/` - configuration records, validation, threshold persistence
//! - `hw/` - reading sources, the per-sensor poll loop, GPIO leases
//! - `publisher` - the seam to the object bus
//! - `directory` - peer sensor lookup by key
//! - `external` - externally written, perishable sensors
//!
//! # Example
//!
//! ```no_run
//! use std::rc::Rc;
//! use sd_core::{MemoryPublisher, SensorContext, SensorCore, SensorDefinition};
//!
//! let publisher = Rc::new(MemoryPublisher::new());
//! let def = SensorDefinition::new("Inlet Temp", "/inv/Inlet", "TMP75", "DegreesC", -128.0, 127.0);
//! let mut sensor = SensorCore::new(def, SensorContext::new(publisher)).unwrap();
//! sensor.update_value(31.5);
//! ```

// Grouped modules
pub mod data;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod constants;
pub mod directory;
pub mod error;
pub mod external;
pub mod publisher;

pub use data::{
    default_limits, load_sensor_configs, load_threshold_overrides, save_threshold_overrides,
    validate_bounds, validate_file_size, validate_sensor_name, validate_units,
    JsonThresholdStore, PersistedThreshold, SensorConfig, ThresholdConfig, ThresholdOverrides,
    ThresholdStore, EXTERNAL_SENSOR_TYPE,
};

pub use engine::{
    should_publish, AccessPolicy, AlarmEdge, AvailabilityTracker, ErrorOutcome,
    ExternalSetHook, Instrumentation, OverrideState, PowerState, PowerStatus, SensorContext,
    SensorCore, SensorDefinition, SensorIdentity, SensorValue, Threshold, ThresholdSet,
};

pub use hw::{
    spawn_poller, split_file_name, units_for_hwmon_type, HwmonFileSource, LineCache, LineLease,
    PollHandle, PollSchedule, Reading, ReadingSource, SharedSensor,
};

pub use directory::{DirectoryReader, PeerWatch, SensorDirectory};
pub use error::{Result, SensorError};
pub use external::{spawn_timeout_watch, ExternalSensor};
pub use publisher::{BroadcastPublisher, MemoryPublisher, Publisher};

pub use sd_protocol::{Direction, Level, Property};
