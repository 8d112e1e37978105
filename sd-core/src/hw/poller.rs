//! Per-sensor poll loop
//!
//! Each sensor gets one local task on the event loop. A cycle is:
//! wait for the tick, hand the source to the blocking pool, wait for the
//! read, feed the result into the core. Reads never overlap for one sensor.
//!
//! The task only holds a `Weak` to its sensor and re-checks it after every
//! suspension point, so a read that completes after the sensor was dropped
//! touches nothing. [`PollHandle::shutdown`] cancels the timer and returns
//! once the task has fully drained.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::constants::timing;
use crate::engine::SensorCore;
use crate::hw::source::ReadingSource;

pub type SharedSensor = Rc<RefCell<SensorCore>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Delay after a good read
    pub interval: Duration,
    /// Delay after a failed or power-gated read
    pub failed_interval: Duration,
}

impl PollSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            failed_interval: timing::FAILED_POLL,
        }
    }

    pub fn with_failed_interval(mut self, failed_interval: Duration) -> Self {
        self.failed_interval = failed_interval;
        self
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(timing::DEFAULT_POLL)
    }
}

/// Owner's side of a spawned poll or watch task
pub struct PollHandle {
    name: String,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollHandle {
    pub(crate) fn new(name: String, cancel: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { name, cancel, task }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the task to stop at its next suspension point
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// True once the task has finished and no read is in flight
    pub fn is_quiescent(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait until the task is quiescent
    pub async fn shutdown(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!(sensor = %self.name, "Poll task panicked");
            }
        }
        trace!(sensor = %self.name, "Poll task drained");
    }
}

/// Spawn the poll loop for `sensor` on the current `LocalSet`
pub fn spawn_poller<S: ReadingSource>(
    sensor: &SharedSensor,
    source: S,
    schedule: PollSchedule,
) -> PollHandle {
    let name = sensor.borrow().name().to_string();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let task = tokio::task::spawn_local(poll_loop(
        Rc::downgrade(sensor),
        source,
        schedule,
        cancel_rx,
        name.clone(),
    ));
    PollHandle::new(name, cancel_tx, task)
}

async fn poll_loop<S: ReadingSource>(
    sensor: Weak<RefCell<SensorCore>>,
    source: S,
    schedule: PollSchedule,
    mut cancel: watch::Receiver<bool>,
    name: String,
) {
    let mut source = Some(source);
    debug!(sensor = %name, interval_ms = schedule.interval.as_millis() as u64, "Polling started");

    loop {
        if *cancel.borrow() {
            break;
        }

        let Some(strong) = sensor.upgrade() else { break };
        let gated = !strong.borrow().reading_state_good();
        drop(strong);

        let delay = if gated {
            // update_value marks the sensor unavailable and publishes NaN
            let Some(strong) = sensor.upgrade() else { break };
            strong.borrow_mut().update_value(f64::NAN);
            schedule.failed_interval
        } else {
            let Some(mut src) = source.take() else { break };
            let read = tokio::task::spawn_blocking(move || {
                let result = src.read();
                (src, result)
            });
            let (src, result) = match read.await {
                Ok(done) => done,
                Err(e) => {
                    warn!(sensor = %name, "Blocking read aborted: {}", e);
                    break;
                }
            };

            // The sensor may have been cancelled or dropped while we waited
            if *cancel.borrow() {
                break;
            }
            let Some(strong) = sensor.upgrade() else { break };

            let delay = match result {
                Ok(reading) => {
                    let mut core = strong.borrow_mut();
                    core.set_raw_value(reading.raw);
                    core.update_value(reading.value);
                    schedule.interval
                }
                Err(e) => {
                    debug!(sensor = %name, source = %src.describe(), "Read failed: {}", e);
                    strong.borrow_mut().increment_error();
                    schedule.failed_interval
                }
            };
            source = Some(src);
            delay
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.changed() => break,
        }
    }

    debug!(sensor = %name, "Polling stopped");
}
