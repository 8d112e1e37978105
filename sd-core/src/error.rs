//! Error types re-exported from sd-error

pub use sd_error::{Result, SensorError};
