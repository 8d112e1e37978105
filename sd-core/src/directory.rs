//! Peer sensor directory
//!
//! Sensors that other sensors depend on (a CPU's Tcontrol feeding its core
//! temperature thresholds, for example) publish their latest value here under
//! a key. Dependents get a read-only [`DirectoryReader`] at construction and
//! poll it; nothing here is process-global.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: f64,
    generation: u64,
}

fn same_value(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Writable directory handle held by the sensor owner
#[derive(Debug, Clone, Default)]
pub struct SensorDirectory {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SensorDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest value for `key`. The generation only moves when the
    /// value actually changes.
    pub fn update(&self, key: &str, value: f64) {
        let mut entries = self.entries.write();
        match entries.get_mut(key) {
            Some(entry) if same_value(entry.value, value) => {}
            Some(entry) => {
                entry.value = value;
                entry.generation += 1;
            }
            None => {
                entries.insert(key.to_string(), Entry { value, generation: 0 });
            }
        }
    }

    pub fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    pub fn reader(&self) -> DirectoryReader {
        DirectoryReader {
            entries: Arc::clone(&self.entries),
        }
    }
}

/// Read-only view handed to dependent sensors
#[derive(Debug, Clone)]
pub struct DirectoryReader {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl DirectoryReader {
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries.read().get(key).map(|e| e.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn watch(&self, key: impl Into<String>) -> PeerWatch {
        PeerWatch {
            reader: self.clone(),
            key: key.into(),
            last_seen: None,
        }
    }

    fn entry(&self, key: &str) -> Option<Entry> {
        self.entries.read().get(key).copied()
    }
}

/// Tracks one peer and reports each new value once
#[derive(Debug, Clone)]
pub struct PeerWatch {
    reader: DirectoryReader,
    key: String,
    last_seen: Option<u64>,
}

impl PeerWatch {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current peer value, if the peer is registered
    pub fn current(&self) -> Option<f64> {
        self.reader.get(&self.key)
    }

    /// Returns the peer value if it changed since the last call
    pub fn changed(&mut self) -> Option<f64> {
        let entry = match self.reader.entry(&self.key) {
            Some(entry) => entry,
            None => {
                // Peer went away; a re-registration counts as new
                self.last_seen = None;
                return None;
            }
        };
        if self.last_seen == Some(entry.generation) {
            return None;
        }
        self.last_seen = Some(entry.generation);
        Some(entry.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sees_writer_updates() {
        let dir = SensorDirectory::new();
        let reader = dir.reader();
        assert_eq!(reader.get("Tcontrol_CPU1"), None);

        dir.update("Tcontrol_CPU1", 85.0);
        assert_eq!(reader.get("Tcontrol_CPU1"), Some(85.0));
        assert_eq!(reader.keys(), vec!["Tcontrol_CPU1".to_string()]);

        dir.remove("Tcontrol_CPU1");
        assert!(!reader.contains("Tcontrol_CPU1"));
    }

    #[test]
    fn test_watch_reports_each_change_once() {
        let dir = SensorDirectory::new();
        let mut watch = dir.reader().watch("peer");
        assert_eq!(watch.changed(), None);

        dir.update("peer", 1.0);
        assert_eq!(watch.changed(), Some(1.0));
        assert_eq!(watch.changed(), None);

        dir.update("peer", 1.0);
        assert_eq!(watch.changed(), None);

        dir.update("peer", 2.0);
        assert_eq!(watch.changed(), Some(2.0));
    }

    #[test]
    fn test_watch_sees_reregistration() {
        let dir = SensorDirectory::new();
        let mut watch = dir.reader().watch("peer");
        dir.update("peer", 5.0);
        assert_eq!(watch.changed(), Some(5.0));

        dir.remove("peer");
        assert_eq!(watch.changed(), None);
        dir.update("peer", 5.0);
        assert_eq!(watch.changed(), Some(5.0));
    }
}
