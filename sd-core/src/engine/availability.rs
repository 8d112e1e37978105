//! Functional / Available health tracking and power-state gating
//!
//! - **Functional** drops after `error_threshold` consecutive failed reads and
//!   recovers on the very next good reading.
//! - **Available** follows the power domain and explicit availability writes.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::constants::sensor as sensor_const;

/// Chassis power condition a sensor needs before its readings mean anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PowerState {
    #[default]
    Always,
    On,
    BiosPost,
}

impl PowerState {
    pub fn reading_allowed(self, status: &PowerStatus) -> bool {
        match self {
            PowerState::Always => true,
            PowerState::On => status.is_power_on(),
            PowerState::BiosPost => status.is_power_on() && status.has_bios_post(),
        }
    }
}

#[derive(Debug, Default)]
struct PowerFlags {
    pgood: AtomicBool,
    post_complete: AtomicBool,
}

/// Shared chassis power status, updated by the power-control signal handler
#[derive(Debug, Clone, Default)]
pub struct PowerStatus {
    flags: Arc<PowerFlags>,
}

impl PowerStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_power_on(&self, on: bool) {
        self.flags.pgood.store(on, Ordering::SeqCst);
    }

    pub fn set_post_complete(&self, complete: bool) {
        self.flags.post_complete.store(complete, Ordering::SeqCst);
    }

    pub fn is_power_on(&self) -> bool {
        self.flags.pgood.load(Ordering::SeqCst)
    }

    pub fn has_bios_post(&self) -> bool {
        self.flags.post_complete.load(Ordering::SeqCst)
    }
}

/// Result of recording one failed read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Counted, still below the threshold
    Counted(usize),
    /// This error reached the threshold; the sensor must be marked non-functional
    Escalated,
    /// Already escalated; further errors are ignored until a good read
    Saturated,
}

#[derive(Debug, Clone)]
pub struct AvailabilityTracker {
    error_count: usize,
    error_threshold: usize,
    functional: bool,
    available: bool,
}

impl AvailabilityTracker {
    pub fn new() -> Self {
        Self::with_error_threshold(sensor_const::ERROR_THRESHOLD)
    }

    pub fn with_error_threshold(error_threshold: usize) -> Self {
        Self {
            error_count: 0,
            error_threshold: error_threshold.max(1),
            functional: true,
            available: true,
        }
    }

    pub fn record_error(&mut self) -> ErrorOutcome {
        if self.error_count >= self.error_threshold {
            return ErrorOutcome::Saturated;
        }
        self.error_count += 1;
        if self.error_count == self.error_threshold {
            ErrorOutcome::Escalated
        } else {
            ErrorOutcome::Counted(self.error_count)
        }
    }

    /// Returns true if the flag changed
    pub fn set_functional(&mut self, functional: bool) -> bool {
        if functional {
            self.error_count = 0;
        }
        let changed = self.functional != functional;
        self.functional = functional;
        changed
    }

    /// Returns true if the flag changed. Always resets the error count.
    pub fn set_available(&mut self, available: bool) -> bool {
        self.error_count = 0;
        let changed = self.available != available;
        self.available = available;
        changed
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn error_threshold(&self) -> usize {
        self.error_threshold
    }

    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn is_available(&self) -> bool {
        self.available
    }
}

impl Default for AvailabilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalates_exactly_at_threshold() {
        let mut t = AvailabilityTracker::new();
        for i in 1..5 {
            assert_eq!(t.record_error(), ErrorOutcome::Counted(i));
        }
        assert_eq!(t.record_error(), ErrorOutcome::Escalated);
        assert_eq!(t.record_error(), ErrorOutcome::Saturated);
        assert_eq!(t.error_count(), 5);
    }

    #[test]
    fn test_good_read_resets_count() {
        let mut t = AvailabilityTracker::with_error_threshold(3);
        t.record_error();
        t.record_error();
        t.set_functional(true);
        assert_eq!(t.error_count(), 0);
        assert_eq!(t.record_error(), ErrorOutcome::Counted(1));
    }

    #[test]
    fn test_flag_changes_reported_once() {
        let mut t = AvailabilityTracker::new();
        assert!(!t.set_available(true));
        assert!(t.set_available(false));
        assert!(!t.set_available(false));
        assert!(t.set_functional(false));
        assert!(!t.set_functional(false));
        assert!(t.set_functional(true));
    }

    #[test]
    fn test_power_gating() {
        let status = PowerStatus::new();
        assert!(PowerState::Always.reading_allowed(&status));
        assert!(!PowerState::On.reading_allowed(&status));

        status.set_power_on(true);
        assert!(PowerState::On.reading_allowed(&status));
        assert!(!PowerState::BiosPost.reading_allowed(&status));

        status.set_post_complete(true);
        assert!(PowerState::BiosPost.reading_allowed(&status));

        status.set_power_on(false);
        assert!(!PowerState::BiosPost.reading_allowed(&status));
    }

    #[test]
    fn test_power_status_shared_between_clones() {
        let a = PowerStatus::new();
        let b = a.clone();
        a.set_power_on(true);
        assert!(b.is_power_on());
    }
}
