//! The daemon's live sensor set
//!
//! Sensors are created from configuration records and replaced or removed
//! when configuration changes. A sensor is only dropped after its poll task
//! has drained, so no read completes into a half-torn-down object.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use sd_core::constants::timing;
use sd_core::{
    spawn_poller, spawn_timeout_watch, ExternalSensor, HwmonFileSource, JsonThresholdStore,
    PollHandle, PollSchedule, Result, SensorConfig, SensorContext, SensorCore, SensorDirectory,
    SensorError, SharedSensor,
};
use sd_protocol::escape_path_for_bus;

enum LiveSensor {
    Polled {
        sensor: SharedSensor,
        poller: PollHandle,
    },
    External {
        sensor: Rc<RefCell<ExternalSensor>>,
        watch: Option<PollHandle>,
    },
}

impl LiveSensor {
    fn name(&self) -> String {
        match self {
            LiveSensor::Polled { sensor, .. } => sensor.borrow().name().to_string(),
            LiveSensor::External { sensor, .. } => sensor.borrow().core().name().to_string(),
        }
    }

    /// Stop background work, wait for it to drain, then drop the sensor
    async fn retire(self) {
        let name = self.name();
        match self {
            LiveSensor::Polled { sensor, poller } => {
                poller.shutdown().await;
                if Rc::strong_count(&sensor) > 1 {
                    warn!(sensor = %name, "Sensor still referenced after poller drained");
                }
                drop(sensor);
            }
            LiveSensor::External { sensor, watch } => {
                if let Some(watch) = watch {
                    watch.shutdown().await;
                }
                drop(sensor);
            }
        }
        debug!(sensor = %name, "Sensor retired");
    }
}

/// Outcome of applying a configuration
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub replaced: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

pub struct SensorSet {
    context: SensorContext,
    store: Option<Rc<JsonThresholdStore>>,
    directory: SensorDirectory,
    live: BTreeMap<String, (SensorConfig, LiveSensor)>,
}

impl SensorSet {
    pub fn new(
        context: SensorContext,
        store: Option<Rc<JsonThresholdStore>>,
        directory: SensorDirectory,
    ) -> Self {
        Self {
            context,
            store,
            directory,
            live: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Bring the live set in line with `configs`.
    ///
    /// A failing record only costs that one sensor.
    pub async fn apply(&mut self, configs: BTreeMap<String, SensorConfig>) -> ApplyStats {
        let mut stats = ApplyStats::default();

        let gone: Vec<String> = self
            .live
            .keys()
            .filter(|path| !configs.contains_key(*path))
            .cloned()
            .collect();
        for path in gone {
            if let Some((_, sensor)) = self.live.remove(&path) {
                sensor.retire().await;
                stats.removed += 1;
            }
        }

        for (path, config) in configs {
            let replacing = match self.live.get(&path) {
                Some((current, _)) if *current == config => {
                    stats.unchanged += 1;
                    continue;
                }
                Some(_) => true,
                None => false,
            };

            if let Some((_, old)) = self.live.remove(&path) {
                old.retire().await;
            }

            match self.build(&path, &config) {
                Ok(sensor) => {
                    self.live.insert(path, (config, sensor));
                    if replacing {
                        stats.replaced += 1;
                    } else {
                        stats.created += 1;
                    }
                }
                Err(e) => {
                    error!(config = %path, sensor = %config.name, "Failed to create sensor: {}", e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            created = stats.created,
            replaced = stats.replaced,
            removed = stats.removed,
            unchanged = stats.unchanged,
            failed = stats.failed,
            "Sensor configuration applied"
        );
        stats
    }

    /// Retire every sensor
    pub async fn shutdown(&mut self) {
        let live = std::mem::take(&mut self.live);
        for (_, (_, sensor)) in live {
            sensor.retire().await;
        }
    }

    /// Bus names double as directory keys, so two records may not share one
    fn check_unique_name(&self, path: &str, config: &SensorConfig) -> Result<()> {
        let name = escape_path_for_bus(&config.name);
        let taken = self
            .live
            .iter()
            .find(|(other, entry)| other.as_str() != path && escape_path_for_bus(&entry.0.name) == name);
        match taken {
            Some((other, _)) => Err(SensorError::invalid_config(
                "Name",
                format!("{} is already used by {}", config.name, other),
            )),
            None => Ok(()),
        }
    }

    fn build(&self, path: &str, config: &SensorConfig) -> Result<LiveSensor> {
        self.check_unique_name(path, config)?;
        let mut definition = config.to_definition(path)?;
        if let Some(store) = self.store.as_ref() {
            let applied = store.apply(path, &mut definition.thresholds);
            if applied > 0 {
                debug!(sensor = %config.name, applied, "Applied persisted thresholds");
            }
        }

        if config.is_external() {
            let sensor = ExternalSensor::new(definition, config.timeout(), self.context.clone())?;
            let sensor = Rc::new(RefCell::new(sensor));
            let watch = config
                .timeout()
                .map(|_| spawn_timeout_watch(&sensor, timing::EXTERNAL_TIMEOUT_CHECK));
            return Ok(LiveSensor::External { sensor, watch });
        }

        // Validate the source before anything is registered
        let source = HwmonFileSource::from_config(config)?;
        let mut core = SensorCore::new(definition, self.context.clone())?;
        let key = core.name().to_string();
        core.attach_directory(self.directory.clone(), key);

        let sensor = Rc::new(RefCell::new(core));
        let poller = spawn_poller(&sensor, source, PollSchedule::new(config.poll_interval()));
        Ok(LiveSensor::Polled { sensor, poller })
    }
}
