//! Who may inject a `Value` into a sensor from outside

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct AccessFlags {
    manufacturing_mode: AtomicBool,
    insecure_override: AtomicBool,
}

/// Process-wide override permissions, shared by every sensor
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    flags: Arc<AccessFlags>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_manufacturing_mode(&self, enabled: bool) {
        self.flags.manufacturing_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn set_insecure_override(&self, enabled: bool) {
        self.flags.insecure_override.store(enabled, Ordering::SeqCst);
    }

    pub fn manufacturing_mode(&self) -> bool {
        self.flags.manufacturing_mode.load(Ordering::SeqCst)
    }

    pub fn insecure_override(&self) -> bool {
        self.flags.insecure_override.load(Ordering::SeqCst)
    }

    /// Whether a sensor with the given settable flag accepts external writes
    pub fn allows_write(&self, settable: bool) -> bool {
        settable || self.manufacturing_mode() || self.insecure_override()
    }
}
