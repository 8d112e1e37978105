//! Publisher seam between the sensor engine and the object bus
//!
//! The engine only emits property changes; transport is someone else's job.
//! [`BroadcastPublisher`] fans events out to in-process subscribers and
//! [`MemoryPublisher`] keeps them for inspection.

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use sd_protocol::{BusEvent, EventEnvelope, Property, SensorProperties};

use crate::error::{Result, SensorError};

pub trait Publisher {
    /// Make a sensor object visible with its full initial property set
    fn register(&self, path: &str, properties: &SensorProperties) -> Result<()>;

    /// Announce a single property change
    fn publish(&self, path: &str, property: Property);

    /// Remove a sensor object
    fn unregister(&self, path: &str);
}

/// Broadcasts every event to all current subscribers
pub struct BroadcastPublisher {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    fn send(&self, event: BusEvent) {
        // No subscribers is fine: nobody is listening yet
        if self.tx.send(EventEnvelope::new(event)).is_err() {
            trace!("Bus event dropped, no subscribers");
        }
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(crate::constants::limits::EVENT_CHANNEL_CAPACITY)
    }
}

impl Publisher for BroadcastPublisher {
    fn register(&self, path: &str, properties: &SensorProperties) -> Result<()> {
        self.send(BusEvent::Registered {
            path: path.to_string(),
            properties: properties.clone(),
        });
        Ok(())
    }

    fn publish(&self, path: &str, property: Property) {
        self.send(BusEvent::PropertyChanged {
            path: path.to_string(),
            property,
        });
    }

    fn unregister(&self, path: &str) {
        self.send(BusEvent::Removed {
            path: path.to_string(),
        });
    }
}

/// Records events in order
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<BusEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<BusEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// All changes of the named property on `path`, oldest first
    pub fn property_changes(&self, path: &str, name: &str) -> Vec<Property> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                BusEvent::PropertyChanged { path: p, property } if p == path && property.name() == name => {
                    Some(property.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Published `Value` updates on `path`
    pub fn values(&self, path: &str) -> Vec<f64> {
        self.property_changes(path, "Value")
            .into_iter()
            .filter_map(|p| match p {
                Property::Value(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Alarm edges on `path` for the named alarm property
    pub fn alarms(&self, path: &str, alarm: &str) -> Vec<bool> {
        self.property_changes(path, alarm)
            .into_iter()
            .filter_map(|p| match p {
                Property::Alarm { asserted, .. } => Some(asserted),
                _ => None,
            })
            .collect()
    }

    pub fn is_registered(&self, path: &str) -> bool {
        let events = self.events.lock();
        let mut registered = false;
        for e in events.iter() {
            match e {
                BusEvent::Registered { path: p, .. } if p == path => registered = true,
                BusEvent::Removed { path: p } if p == path => registered = false,
                _ => {}
            }
        }
        registered
    }
}

impl Publisher for MemoryPublisher {
    /// Fails when `path` is already registered
    fn register(&self, path: &str, properties: &SensorProperties) -> Result<()> {
        if self.is_registered(path) {
            return Err(SensorError::Publish {
                path: path.to_string(),
                reason: "object path already registered".into(),
            });
        }
        self.events.lock().push(BusEvent::Registered {
            path: path.to_string(),
            properties: properties.clone(),
        });
        Ok(())
    }

    fn publish(&self, path: &str, property: Property) {
        self.events.lock().push(BusEvent::PropertyChanged {
            path: path.to_string(),
            property,
        });
    }

    fn unregister(&self, path: &str) {
        self.events.lock().push(BusEvent::Removed {
            path: path.to_string(),
        });
    }
}
