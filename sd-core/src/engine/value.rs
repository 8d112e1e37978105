//! Sensor value with range-derived hysteresis bands
//!
//! The publish band throttles bus traffic for noisy sensors. A NaN on either
//! side always publishes, so every reported loss of a reading reaches the bus.

use crate::constants::sensor as sensor_const;

/// Returns true when `new` differs enough from `old` to be republished
pub fn should_publish(old: f64, new: f64, band: f64) -> bool {
    if old.is_nan() || new.is_nan() {
        return true;
    }
    (old - new).abs() > band
}

#[derive(Debug, Clone)]
pub struct SensorValue {
    value: f64,
    raw_value: f64,
    min_value: f64,
    max_value: f64,
    hysteresis_trigger: f64,
    hysteresis_publish: f64,
}

impl SensorValue {
    /// Create an unknown (NaN) value over `[min, max]`.
    ///
    /// Both hysteresis bands are fixed here from the initial range.
    pub fn new(min_value: f64, max_value: f64) -> Self {
        let range = max_value - min_value;
        Self {
            value: f64::NAN,
            raw_value: f64::NAN,
            min_value,
            max_value,
            hysteresis_trigger: range * sensor_const::HYSTERESIS_TRIGGER_FACTOR,
            hysteresis_publish: range * sensor_const::HYSTERESIS_PUBLISH_FACTOR,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn raw_value(&self) -> f64 {
        self.raw_value
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    pub fn hysteresis_trigger(&self) -> f64 {
        self.hysteresis_trigger
    }

    pub fn hysteresis_publish(&self) -> f64 {
        self.hysteresis_publish
    }

    pub fn requires_update(&self, new: f64) -> bool {
        should_publish(self.value, new, self.hysteresis_publish)
    }

    pub(crate) fn set(&mut self, value: f64) {
        self.value = value;
    }

    pub(crate) fn set_raw(&mut self, raw: f64) {
        self.raw_value = raw;
    }

    /// Forget the last published value so the next reading always publishes
    pub(crate) fn invalidate(&mut self) {
        self.value = f64::NAN;
    }

    /// Store a new minimum if it passes the publish filter
    pub(crate) fn update_min(&mut self, min: f64) -> bool {
        if should_publish(self.min_value, min, self.hysteresis_publish) {
            self.min_value = min;
            return true;
        }
        false
    }

    /// Store a new maximum if it passes the publish filter
    pub(crate) fn update_max(&mut self, max: f64) -> bool {
        if should_publish(self.max_value, max, self.hysteresis_publish) {
            self.max_value = max;
            return true;
        }
        false
    }
}
