//! Sensors whose values come from outside the daemon
//!
//! An external sensor has no poller. Another process writes `Value` and the
//! sensor republishes it with the usual threshold handling. With a timeout
//! configured the value is perishable: once no write has arrived for the
//! timeout period it is invalidated to NaN.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::{SensorContext, SensorCore, SensorDefinition};
use crate::error::Result;
use crate::hw::PollHandle;

pub struct ExternalSensor {
    core: SensorCore,
    timeout: Option<Duration>,
    last_write: Rc<Cell<Option<Instant>>>,
    stale: bool,
}

impl ExternalSensor {
    pub fn new(
        mut definition: SensorDefinition,
        timeout: Option<Duration>,
        context: SensorContext,
    ) -> Result<Self> {
        definition.settable = true;
        definition.mutable = true;

        let mut core = SensorCore::new(definition, context)?;
        let last_write = Rc::new(Cell::new(None));

        let hook_write = Rc::clone(&last_write);
        core.set_external_set_hook(Box::new(move |_| {
            hook_write.set(Some(Instant::now()));
        }));

        if let Some(timeout) = timeout {
            debug!(sensor = %core.name(), timeout_ms = timeout.as_millis() as u64, "Perishable external sensor");
        }

        Ok(Self {
            core,
            timeout,
            last_write,
            stale: false,
        })
    }

    /// Accept an external write. Re-arms the timeout.
    pub fn set_value(&mut self, value: f64) -> Result<()> {
        self.core.set_sensor_value(value)?;
        // Writes are the normal data path here, not an override
        self.core.release_override();
        if self.stale && !value.is_nan() {
            info!(sensor = %self.core.name(), "External sensor fresh again");
        }
        self.stale = false;
        Ok(())
    }

    /// Whether the last write is still within the timeout
    pub fn is_viable(&self, now: Instant) -> bool {
        let Some(timeout) = self.timeout else { return true };
        match self.last_write.get() {
            Some(at) => now.saturating_duration_since(at) < timeout,
            None => false,
        }
    }

    /// Time since the last write, if any
    pub fn age_elapsed(&self, now: Instant) -> Option<Duration> {
        self.last_write
            .get()
            .map(|at| now.saturating_duration_since(at))
    }

    /// Time until the current value goes stale; `None` if it never does
    pub fn age_remaining(&self, now: Instant) -> Option<Duration> {
        let timeout = self.timeout?;
        Some(match self.age_elapsed(now) {
            Some(elapsed) => timeout.saturating_sub(elapsed),
            None => Duration::ZERO,
        })
    }

    /// Invalidate the value if it has gone stale; returns true on the
    /// transition to stale
    pub fn check_timeout(&mut self, now: Instant) -> bool {
        if self.is_viable(now) || self.stale {
            return false;
        }
        self.stale = true;
        if self.last_write.get().is_some() {
            warn!(
                sensor = %self.core.name(),
                elapsed_ms = self.age_elapsed(now).map_or(0, |d| d.as_millis() as u64),
                "External sensor value timed out"
            );
        }
        self.core.update_value(f64::NAN);
        true
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn core(&self) -> &SensorCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut SensorCore {
        &mut self.core
    }
}

/// Periodically expire stale values of one external sensor
pub fn spawn_timeout_watch(sensor: &Rc<RefCell<ExternalSensor>>, period: Duration) -> PollHandle {
    let name = sensor.borrow().core().name().to_string();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::task::spawn_local(timeout_loop(Rc::downgrade(sensor), period, cancel_rx));
    PollHandle::new(name, cancel_tx, task)
}

async fn timeout_loop(
    sensor: Weak<RefCell<ExternalSensor>>,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.changed() => break,
        }
        if *cancel.borrow() {
            break;
        }
        let Some(strong) = sensor.upgrade() else { break };
        strong.borrow_mut().check_timeout(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::MemoryPublisher;

    const PATH: &str = "/xyz/openbmc_project/sensors/temperature/Ambient";

    fn external(timeout: Option<Duration>) -> (ExternalSensor, Rc<MemoryPublisher>) {
        let publisher = Rc::new(MemoryPublisher::new());
        let def = SensorDefinition::new("Ambient", "/cfg/Ambient", "ExternalSensor", "DegreesC", -40.0, 85.0);
        let sensor = ExternalSensor::new(def, timeout, SensorContext::new(publisher.clone())).unwrap();
        (sensor, publisher)
    }

    #[test]
    fn test_write_publishes_and_stays_unoverridden() {
        let (mut sensor, publisher) = external(None);
        sensor.set_value(21.5).unwrap();
        assert_eq!(sensor.core().value(), 21.5);
        assert!(!sensor.core().is_overridden());
        assert_eq!(publisher.values(PATH), vec![21.5]);
    }

    #[test]
    fn test_without_timeout_never_stale() {
        let (mut sensor, _) = external(None);
        let later = Instant::now() + Duration::from_secs(3600);
        assert!(sensor.is_viable(later));
        assert_eq!(sensor.age_remaining(later), None);
        assert!(!sensor.check_timeout(later));
    }

    #[test]
    fn test_timeout_invalidates_once() {
        let (mut sensor, publisher) = external(Some(Duration::from_secs(4)));
        let start = Instant::now();
        assert!(!sensor.is_viable(start));

        sensor.set_value(30.0).unwrap();
        let now = Instant::now();
        assert!(sensor.is_viable(now));
        assert!(sensor.age_remaining(now).unwrap() <= Duration::from_secs(4));

        let later = now + Duration::from_secs(5);
        assert!(!sensor.is_viable(later));
        assert_eq!(sensor.age_remaining(later), Some(Duration::ZERO));
        assert!(sensor.check_timeout(later));
        assert!(sensor.core().value().is_nan());
        assert!(!sensor.check_timeout(later + Duration::from_secs(1)));

        let values = publisher.values(PATH);
        assert_eq!(values.len(), 2);
        assert!(values[1].is_nan());
    }

    #[test]
    fn test_write_rearms_after_timeout() {
        let (mut sensor, _) = external(Some(Duration::from_secs(1)));
        sensor.set_value(10.0).unwrap();
        sensor.check_timeout(Instant::now() + Duration::from_secs(2));
        sensor.set_value(11.0).unwrap();
        assert!(sensor.is_viable(Instant::now()));
        assert_eq!(sensor.core().value(), 11.0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_timeout_watch_expires_value() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let (mut sensor, _) = external(Some(Duration::from_millis(20)));
                sensor.set_value(25.0).unwrap();
                let shared = Rc::new(RefCell::new(sensor));

                let handle = spawn_timeout_watch(&shared, Duration::from_millis(5));
                tokio::time::sleep(Duration::from_millis(80)).await;
                assert!(shared.borrow().core().value().is_nan());
                handle.shutdown().await;
            })
            .await;
    }
}
