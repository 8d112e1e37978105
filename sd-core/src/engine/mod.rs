//! Sensor engine
//!
//! Value filtering, threshold evaluation, health tracking and the
//! [`SensorCore`] that ties them to a published object.

mod access;
mod availability;
mod instrumentation;
mod sensor;
mod threshold;
mod value;

pub use access::AccessPolicy;
pub use availability::{AvailabilityTracker, ErrorOutcome, PowerState, PowerStatus};
pub use instrumentation::Instrumentation;
pub use sensor::{
    ExternalSetHook, OverrideState, SensorContext, SensorCore, SensorDefinition, SensorIdentity,
};
pub use threshold::{AlarmEdge, Threshold, ThresholdSet};
pub use value::{should_publish, SensorValue};
