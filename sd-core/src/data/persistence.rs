//! Persistence for threshold edits made over the bus
//!
//! Threshold trigger writes survive a restart by landing in a small JSON file
//! keyed by configuration path. Records are applied on top of the sensor
//! configuration at load time.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sd_protocol::{Direction, Level};

use crate::constants::limits;
use crate::data::validation::validate_file_size;
use crate::engine::Threshold;
use crate::error::{Result, SensorError};

/// Storage for threshold trigger edits
#[cfg_attr(test, mockall::automock)]
pub trait ThresholdStore {
    fn persist(&self, configuration_path: &str, object_type: &str, threshold: &Threshold) -> Result<()>;
}

/// One persisted trigger value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersistedThreshold {
    #[serde(rename = "Type")]
    pub object_type: String,
    pub severity: u8,
    pub direction: String,
    pub value: f64,
}

impl PersistedThreshold {
    fn from_threshold(object_type: &str, threshold: &Threshold) -> Self {
        Self {
            object_type: object_type.to_string(),
            severity: threshold.level.severity(),
            direction: threshold.direction.as_config_str().to_string(),
            value: threshold.value,
        }
    }

    fn matches(&self, level: Level, direction: Direction) -> bool {
        Level::from_severity(u64::from(self.severity)) == Some(level)
            && Direction::from_config_str(&self.direction) == Some(direction)
    }
}

/// All persisted edits, keyed by configuration path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdOverrides {
    #[serde(default)]
    pub sensors: BTreeMap<String, Vec<PersistedThreshold>>,
}

impl ThresholdOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for this (level, direction)
    pub fn upsert(&mut self, configuration_path: &str, record: PersistedThreshold) {
        let records = self.sensors.entry(configuration_path.to_string()).or_default();
        records.retain(|r| !(r.severity == record.severity && r.direction == record.direction));
        records.push(record);
    }

    pub fn for_path(&self, configuration_path: &str) -> &[PersistedThreshold] {
        self.sensors
            .get(configuration_path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Overwrite trigger values of matching thresholds; returns how many changed
    pub fn apply(&self, configuration_path: &str, thresholds: &mut [Threshold]) -> usize {
        let mut applied = 0;
        for record in self.for_path(configuration_path) {
            if let Some(t) = thresholds
                .iter_mut()
                .find(|t| record.matches(t.level, t.direction))
            {
                t.value = record.value;
                applied += 1;
            }
        }
        applied
    }

    pub fn len(&self) -> usize {
        self.sensors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load persisted edits; a missing file is an empty set
pub fn load_threshold_overrides(path: &Path) -> Result<ThresholdOverrides> {
    if !path.exists() {
        debug!("No threshold store at {:?}, starting empty", path);
        return Ok(ThresholdOverrides::new());
    }

    validate_file_size(path, limits::MAX_THRESHOLD_STORE_SIZE)?;

    let contents = fs::read_to_string(path).map_err(|e| SensorError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let overrides: ThresholdOverrides = serde_json::from_str(&contents)?;

    info!("Loaded {} persisted thresholds from {:?}", overrides.len(), path);
    Ok(overrides)
}

/// Write edits atomically: temp file, fsync, rename
pub fn save_threshold_overrides(path: &Path, overrides: &ThresholdOverrides) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(overrides)?;
    let temp_path = path.with_extension("json.tmp");
    let write_err = |e: std::io::Error| SensorError::FileWrite {
        path: temp_path.clone(),
        source: e,
    };

    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(json.as_bytes()).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| SensorError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!("Saved {} thresholds to {:?}", overrides.len(), path);
    Ok(())
}

/// File-backed [`ThresholdStore`]
pub struct JsonThresholdStore {
    path: PathBuf,
    overrides: Mutex<ThresholdOverrides>,
}

impl JsonThresholdStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let overrides = load_threshold_overrides(&path)?;
        Ok(Self {
            path,
            overrides: Mutex::new(overrides),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn overrides(&self) -> ThresholdOverrides {
        self.overrides.lock().clone()
    }

    pub fn apply(&self, configuration_path: &str, thresholds: &mut [Threshold]) -> usize {
        self.overrides.lock().apply(configuration_path, thresholds)
    }
}

impl ThresholdStore for JsonThresholdStore {
    fn persist(&self, configuration_path: &str, object_type: &str, threshold: &Threshold) -> Result<()> {
        let mut overrides = self.overrides.lock();
        overrides.upsert(
            configuration_path,
            PersistedThreshold::from_threshold(object_type, threshold),
        );
        save_threshold_overrides(&self.path, &overrides)
    }
}
