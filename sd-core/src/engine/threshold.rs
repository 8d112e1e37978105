//! Threshold definitions and alarm evaluation
//!
//! A sensor carries up to eight thresholds, one per (level, direction) pair.
//! Each threshold owns its alarm state and reports an [`AlarmEdge`] only when
//! that state flips, so consumers see every assertion exactly once.
//!
//! # Boundary semantics
//!
//! - **High**: asserts when `value > trigger`, clears when
//!   `value <= trigger - hysteresis`.
//! - **Low**: asserts when `value < trigger`, clears when
//!   `value >= trigger + hysteresis`.
//!
//! NaN readings never change alarm state.

use sd_protocol::{threshold_property, Direction, Level, ThresholdProperty, ThresholdSnapshot};

use crate::constants::sensor as sensor_const;
use crate::error::{Result, SensorError};

/// A single threshold: trigger value, hysteresis band and alarm state
#[derive(Debug, Clone)]
pub struct Threshold {
    pub level: Level,
    pub direction: Direction,
    pub value: f64,
    /// NaN until a default is applied from the owning sensor's range
    pub hysteresis: f64,
    pub alarm_active: bool,
}

impl Threshold {
    pub fn new(level: Level, direction: Direction, value: f64) -> Self {
        Self {
            level,
            direction,
            value,
            hysteresis: f64::NAN,
            alarm_active: false,
        }
    }

    pub fn with_hysteresis(mut self, hysteresis: f64) -> Self {
        self.hysteresis = hysteresis;
        self
    }

    pub fn property(&self) -> &'static ThresholdProperty {
        threshold_property(self.level, self.direction)
    }

    /// Same definition (ignores alarm state)
    pub fn same_definition(&self, other: &Threshold) -> bool {
        self.level == other.level
            && self.direction == other.direction
            && self.value == other.value
            && (self.hysteresis == other.hysteresis
                || (self.hysteresis.is_nan() && other.hysteresis.is_nan()))
    }

    fn band(&self) -> f64 {
        if self.hysteresis.is_nan() {
            0.0
        } else {
            self.hysteresis
        }
    }

    /// Apply a reading; returns the new alarm state if it flipped
    fn evaluate(&mut self, reading: f64) -> Option<bool> {
        if reading.is_nan() {
            return None;
        }

        let (crossed, cleared) = match self.direction {
            Direction::High => (reading > self.value, reading <= self.value - self.band()),
            Direction::Low => (reading < self.value, reading >= self.value + self.band()),
        };

        if !self.alarm_active && crossed {
            self.alarm_active = true;
            Some(true)
        } else if self.alarm_active && cleared {
            self.alarm_active = false;
            Some(false)
        } else {
            None
        }
    }
}

/// An alarm transition produced by [`ThresholdSet::evaluate`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmEdge {
    pub level: Level,
    pub direction: Direction,
    pub asserted: bool,
    pub reading: f64,
    pub trigger: f64,
}

impl AlarmEdge {
    pub fn alarm_property(&self) -> &'static str {
        threshold_property(self.level, self.direction).alarm_property
    }
}

/// Ordered collection of thresholds, at most one per (level, direction)
#[derive(Debug, Clone, Default)]
pub struct ThresholdSet {
    thresholds: Vec<Threshold>,
}

impl ThresholdSet {
    /// Validate and sort a threshold list
    pub fn new(mut thresholds: Vec<Threshold>) -> Result<Self> {
        if thresholds.len() > sensor_const::MAX_THRESHOLDS {
            return Err(SensorError::invalid_config(
                "Thresholds",
                format!(
                    "{} thresholds defined, max {}",
                    thresholds.len(),
                    sensor_const::MAX_THRESHOLDS
                ),
            ));
        }

        for (i, t) in thresholds.iter().enumerate() {
            let name = t.property().level_property;
            if !t.value.is_finite() {
                return Err(SensorError::invalid_threshold(name, "trigger value must be finite"));
            }
            if !t.hysteresis.is_nan() && (t.hysteresis < 0.0 || t.hysteresis.is_infinite()) {
                return Err(SensorError::invalid_threshold(
                    name,
                    "hysteresis must be a non-negative number",
                ));
            }
            if thresholds[..i]
                .iter()
                .any(|o| o.level == t.level && o.direction == t.direction)
            {
                return Err(SensorError::invalid_threshold(name, "defined more than once"));
            }
        }

        thresholds.sort_by_key(|t| (t.level, t.direction == Direction::Low));
        Ok(Self { thresholds })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Give every threshold without its own hysteresis the sensor default
    pub fn apply_default_hysteresis(&mut self, hysteresis: f64) {
        for t in &mut self.thresholds {
            if t.hysteresis.is_nan() {
                t.hysteresis = hysteresis;
            }
        }
    }

    /// Evaluate every threshold in ascending severity order.
    ///
    /// All thresholds are independent; crossing a lower level never
    /// suppresses evaluation of a higher one.
    pub fn evaluate(&mut self, reading: f64) -> Vec<AlarmEdge> {
        self.thresholds
            .iter_mut()
            .filter_map(|t| {
                t.evaluate(reading).map(|asserted| AlarmEdge {
                    level: t.level,
                    direction: t.direction,
                    asserted,
                    reading,
                    trigger: t.value,
                })
            })
            .collect()
    }

    pub fn get(&self, level: Level, direction: Direction) -> Option<&Threshold> {
        self.thresholds
            .iter()
            .find(|t| t.level == level && t.direction == direction)
    }

    /// Change the trigger value of an existing threshold
    pub fn set_value(&mut self, level: Level, direction: Direction, value: f64) -> Result<&Threshold> {
        let name = threshold_property(level, direction).level_property;
        if !value.is_finite() {
            return Err(SensorError::invalid_threshold(name, "trigger value must be finite"));
        }
        let threshold = self
            .thresholds
            .iter_mut()
            .find(|t| t.level == level && t.direction == direction)
            .ok_or_else(|| SensorError::invalid_threshold(name, "not defined on this sensor"))?;
        threshold.value = value;
        Ok(threshold)
    }

    /// Swap in a new definition set, keeping alarm state for pairs that survive.
    ///
    /// Returns false (and changes nothing) when the definitions are identical.
    pub fn replace(&mut self, mut other: ThresholdSet) -> bool {
        let identical = self.thresholds.len() == other.thresholds.len()
            && self
                .thresholds
                .iter()
                .zip(other.thresholds.iter())
                .all(|(a, b)| a.same_definition(b));
        if identical {
            return false;
        }

        for t in &mut other.thresholds {
            if let Some(old) = self.get(t.level, t.direction) {
                t.alarm_active = old.alarm_active;
            }
        }
        *self = other;
        true
    }

    /// True if any alarm at `level` or above is asserted
    pub fn any_alarm_at_or_above(&self, level: Level) -> bool {
        self.thresholds
            .iter()
            .any(|t| t.level >= level && t.alarm_active)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Threshold> {
        self.thresholds.iter()
    }

    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    pub fn snapshot(&self) -> Vec<ThresholdSnapshot> {
        self.thresholds
            .iter()
            .map(|t| ThresholdSnapshot {
                level: t.level,
                direction: t.direction,
                value: t.value,
                alarm: t.alarm_active,
            })
            .collect()
    }
}
