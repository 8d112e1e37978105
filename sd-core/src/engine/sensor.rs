//! The sensor lifecycle engine
//!
//! [`SensorCore`] binds a [`SensorValue`], a [`ThresholdSet`] and an
//! [`AvailabilityTracker`] to one published sensor object. Concrete sensor
//! drivers only feed it readings and read failures:
//!
//! ```text
//! poller -> update_value / increment_error
//!        -> power gate -> publish filter -> thresholds -> Functional/Available
//! ```
//!
//! All state lives on the event-loop thread. There is no locking here; the
//! poller holds the core behind `Rc<RefCell<_>>`.
//!
//! # Override protocol
//!
//! Internal publishes and external `Value` writes share one property setter.
//! Internal publishes raise `internal_set` around the call so the setter does
//! not mistake the sensor's own value for an external override. Once an
//! external write lands, polled readings are ignored until
//! [`SensorCore::clear_override`] is called. Overrides never expire.

use std::rc::Rc;

use tracing::{debug, error, info, warn};

use sd_protocol::{
    escape_path_for_bus, sensor_object_path, Association, Direction, Level, Property,
    SensorProperties,
};

use crate::data::{validate_bounds, validate_sensor_name, validate_units, ThresholdStore};
use crate::directory::SensorDirectory;
use crate::engine::access::AccessPolicy;
use crate::engine::availability::{AvailabilityTracker, ErrorOutcome, PowerState, PowerStatus};
use crate::engine::instrumentation::Instrumentation;
use crate::engine::threshold::{Threshold, ThresholdSet};
use crate::engine::value::SensorValue;
use crate::error::{Result, SensorError};
use crate::publisher::Publisher;

/// Configuration-time description of one sensor
#[derive(Debug, Clone)]
pub struct SensorDefinition {
    pub name: String,
    pub configuration_path: String,
    pub object_type: String,
    pub units: String,
    pub min_value: f64,
    pub max_value: f64,
    pub thresholds: Vec<Threshold>,
    /// Advertise `Mutable` on the bus
    pub mutable: bool,
    /// Accept external `Value` writes without manufacturing mode
    pub settable: bool,
    pub power_state: PowerState,
    /// Defaults to `constants::sensor::ERROR_THRESHOLD`
    pub error_threshold: Option<usize>,
    pub instrumentation: bool,
}

impl SensorDefinition {
    pub fn new(
        name: impl Into<String>,
        configuration_path: impl Into<String>,
        object_type: impl Into<String>,
        units: impl Into<String>,
        min_value: f64,
        max_value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            configuration_path: configuration_path.into(),
            object_type: object_type.into(),
            units: units.into(),
            min_value,
            max_value,
            thresholds: Vec::new(),
            mutable: false,
            settable: false,
            power_state: PowerState::Always,
            error_threshold: None,
            instrumentation: false,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_power_state(mut self, power_state: PowerState) -> Self {
        self.power_state = power_state;
        self
    }

    pub fn settable(mut self, settable: bool) -> Self {
        self.settable = settable;
        self
    }

    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }
}

/// Immutable identity fixed at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorIdentity {
    /// Bus-escaped sensor name
    pub name: String,
    pub configuration_path: String,
    pub object_type: String,
    pub units: String,
    pub object_path: String,
    pub power_state: PowerState,
}

/// Collaborators shared by every sensor of a daemon
#[derive(Clone)]
pub struct SensorContext {
    pub publisher: Rc<dyn Publisher>,
    pub power: PowerStatus,
    pub access: AccessPolicy,
    pub threshold_store: Option<Rc<dyn ThresholdStore>>,
}

impl SensorContext {
    pub fn new(publisher: Rc<dyn Publisher>) -> Self {
        Self {
            publisher,
            power: PowerStatus::new(),
            access: AccessPolicy::new(),
            threshold_store: None,
        }
    }

    pub fn with_power(mut self, power: PowerStatus) -> Self {
        self.power = power;
        self
    }

    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    pub fn with_threshold_store(mut self, store: Rc<dyn ThresholdStore>) -> Self {
        self.threshold_store = Some(store);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverrideState {
    pub overridden: bool,
    pub internal_set: bool,
}

/// Called after every accepted external `Value` write
pub type ExternalSetHook = Box<dyn FnMut(f64)>;

pub struct SensorCore {
    identity: SensorIdentity,
    value: SensorValue,
    thresholds: ThresholdSet,
    availability: AvailabilityTracker,
    override_state: OverrideState,
    mutable: bool,
    settable: bool,
    participates_in_thresholds: bool,
    instrumentation: Option<Instrumentation>,
    external_set_hook: Option<ExternalSetHook>,
    directory: Option<(SensorDirectory, String)>,
    context: SensorContext,
    registered: bool,
}

impl SensorCore {
    /// Validate the definition, then register the sensor in one step.
    ///
    /// On error nothing has been published.
    pub fn new(definition: SensorDefinition, context: SensorContext) -> Result<Self> {
        validate_sensor_name(&definition.name)?;
        let segment = validate_units(&definition.units)?;
        validate_bounds(definition.min_value, definition.max_value)?;

        let value = SensorValue::new(definition.min_value, definition.max_value);
        let mut thresholds = ThresholdSet::new(definition.thresholds)?;
        thresholds.apply_default_hysteresis(value.hysteresis_trigger());

        let availability = match definition.error_threshold {
            Some(n) => AvailabilityTracker::with_error_threshold(n),
            None => AvailabilityTracker::new(),
        };

        let name = escape_path_for_bus(&definition.name);
        let identity = SensorIdentity {
            object_path: sensor_object_path(segment, &name),
            name,
            configuration_path: definition.configuration_path,
            object_type: definition.object_type,
            units: definition.units,
            power_state: definition.power_state,
        };

        let mut core = Self {
            identity,
            value,
            thresholds,
            availability,
            override_state: OverrideState::default(),
            mutable: definition.mutable,
            settable: definition.settable,
            participates_in_thresholds: true,
            instrumentation: definition.instrumentation.then(Instrumentation::new),
            external_set_hook: None,
            directory: None,
            context,
            registered: false,
        };

        core.context
            .publisher
            .register(&core.identity.object_path, &core.properties())?;
        core.registered = true;

        debug!(
            sensor = %core.identity.name,
            path = %core.identity.object_path,
            thresholds = core.thresholds.len(),
            "Sensor registered"
        );
        Ok(core)
    }

    // ------------------------------------------------------------------
    // Polled path
    // ------------------------------------------------------------------

    /// Feed a new reading (NaN for "no reading")
    pub fn update_value(&mut self, new_value: f64) {
        if self.override_state.overridden {
            return;
        }

        if !self.reading_state_good() {
            self.mark_available(false);
            self.publish_value(f64::NAN);
            return;
        }

        self.publish_value(new_value);
        if let Some(inst) = self.instrumentation.as_mut() {
            inst.record(&self.identity.name, new_value);
        }
        self.check_thresholds();

        if !new_value.is_nan() {
            self.mark_functional(true);
            self.mark_available(true);
        }
    }

    /// Evaluate thresholds against the current value and publish alarm edges
    pub fn check_thresholds(&mut self) {
        if !self.participates_in_thresholds {
            return;
        }

        let edges = self.thresholds.evaluate(self.value.value());
        for edge in edges {
            if edge.asserted {
                warn!(
                    sensor = %self.identity.name,
                    alarm = edge.alarm_property(),
                    reading = edge.reading,
                    trigger = edge.trigger,
                    "Threshold asserted"
                );
            } else {
                info!(
                    sensor = %self.identity.name,
                    alarm = edge.alarm_property(),
                    reading = edge.reading,
                    trigger = edge.trigger,
                    "Threshold deasserted"
                );
            }
            self.publish(Property::Alarm {
                name: edge.alarm_property().to_string(),
                asserted: edge.asserted,
            });
        }
    }

    /// Count a failed read; escalates to non-functional at the error threshold
    pub fn increment_error(&mut self) {
        if !self.reading_state_good() {
            self.mark_available(false);
            return;
        }

        match self.availability.record_error() {
            ErrorOutcome::Counted(count) => {
                debug!(sensor = %self.identity.name, count, "Read error");
            }
            ErrorOutcome::Escalated => {
                error!(
                    sensor = %self.identity.name,
                    errors = self.availability.error_threshold(),
                    "Sensor reading error"
                );
                self.mark_functional(false);
            }
            ErrorOutcome::Saturated => {}
        }
    }

    pub fn mark_functional(&mut self, functional: bool) {
        if self.availability.set_functional(functional) {
            self.publish(Property::Functional(functional));
        }
        if !functional {
            self.update_value(f64::NAN);
        }
    }

    pub fn mark_available(&mut self, available: bool) {
        if self.availability.set_available(available) {
            self.publish(Property::Available(available));
        }
    }

    /// Whether the power domain currently allows meaningful readings
    pub fn reading_state_good(&self) -> bool {
        self.identity.power_state.reading_allowed(&self.context.power)
    }

    /// Stash the undecoded reading for diagnostics
    pub fn set_raw_value(&mut self, raw: f64) {
        self.value.set_raw(raw);
    }

    // ------------------------------------------------------------------
    // External write path
    // ------------------------------------------------------------------

    /// External write to `Value`.
    ///
    /// Fails with [`SensorError::PermissionDenied`] unless the sensor is
    /// settable or the access policy allows overrides.
    pub fn set_sensor_value(&mut self, new_value: f64) -> Result<()> {
        if !self.context.access.allows_write(self.settable) {
            warn!(sensor = %self.identity.name, value = new_value, "Rejected external value write");
            return Err(SensorError::PermissionDenied(format!(
                "not allowed to set Value on {}",
                self.identity.object_path
            )));
        }

        self.write_value_property(new_value);
        self.check_thresholds();

        if let Some(hook) = self.external_set_hook.as_mut() {
            hook(new_value);
        }
        Ok(())
    }

    /// Hand control back to the poller. The next reading always publishes.
    pub fn clear_override(&mut self) {
        if self.override_state.overridden {
            info!(sensor = %self.identity.name, "Value override cleared");
        }
        self.override_state.overridden = false;
        self.value.invalidate();
    }

    /// Drop the override flag but keep the written value as current
    pub(crate) fn release_override(&mut self) {
        self.override_state.overridden = false;
    }

    /// External write to `Available`. Going unavailable pushes NaN.
    pub fn set_available(&mut self, available: bool) {
        if available == self.availability.is_available() {
            return;
        }
        self.mark_available(available);
        if !available {
            self.update_value(f64::NAN);
        }
    }

    /// External write to a threshold trigger.
    ///
    /// The edit is persisted when a store is configured; a store failure is
    /// logged and the in-memory edit stands. The cached value is dropped so
    /// the next reading is compared against the new trigger.
    pub fn set_threshold_value(&mut self, level: Level, direction: Direction, value: f64) -> Result<()> {
        let threshold = self.thresholds.set_value(level, direction, value)?.clone();
        let property = threshold.property();

        if let Some(store) = self.context.threshold_store.as_ref() {
            if let Err(e) = store.persist(
                &self.identity.configuration_path,
                &self.identity.object_type,
                &threshold,
            ) {
                warn!(
                    sensor = %self.identity.name,
                    threshold = property.level_property,
                    "Failed to persist threshold: {}",
                    e
                );
            }
        }

        self.publish(Property::Threshold {
            name: property.level_property.to_string(),
            value,
        });
        self.value.invalidate();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dynamic range and thresholds
    // ------------------------------------------------------------------

    /// Revise the advertised range (both filtered by the publish band)
    pub fn update_bounds(&mut self, min_value: f64, max_value: f64) {
        if self.value.update_min(min_value) {
            self.publish(Property::MinValue(min_value));
        }
        if self.value.update_max(max_value) {
            self.publish(Property::MaxValue(max_value));
        }
    }

    /// Swap the threshold definitions; returns false when nothing changed
    pub fn replace_thresholds(&mut self, thresholds: Vec<Threshold>) -> Result<bool> {
        let mut next = ThresholdSet::new(thresholds)?;
        next.apply_default_hysteresis(self.value.hysteresis_trigger());

        let dropped: Vec<&'static str> = self
            .thresholds
            .iter()
            .filter(|t| t.alarm_active && next.get(t.level, t.direction).is_none())
            .map(|t| t.property().alarm_property)
            .collect();

        if !self.thresholds.replace(next) {
            return Ok(false);
        }

        // Alarms of removed thresholds must not stay asserted on the bus
        for alarm in dropped {
            info!(sensor = %self.identity.name, alarm, "Threshold removed while asserted");
            self.publish(Property::Alarm {
                name: alarm.to_string(),
                asserted: false,
            });
        }

        let updates: Vec<Property> = self
            .thresholds
            .iter()
            .map(|t| Property::Threshold {
                name: t.property().level_property.to_string(),
                value: t.value,
            })
            .collect();
        for property in updates {
            self.publish(property);
        }

        debug!(sensor = %self.identity.name, thresholds = self.thresholds.len(), "Thresholds replaced");
        self.value.invalidate();
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    /// Mirror every published value into a peer directory under `key`
    pub fn attach_directory(&mut self, directory: SensorDirectory, key: impl Into<String>) {
        let key = key.into();
        directory.update(&key, self.value.value());
        self.directory = Some((directory, key));
    }

    pub fn set_external_set_hook(&mut self, hook: ExternalSetHook) {
        self.external_set_hook = Some(hook);
    }

    pub fn set_participates_in_thresholds(&mut self, participates: bool) {
        self.participates_in_thresholds = participates;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn identity(&self) -> &SensorIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn object_path(&self) -> &str {
        &self.identity.object_path
    }

    pub fn value(&self) -> f64 {
        self.value.value()
    }

    pub fn raw_value(&self) -> f64 {
        self.value.raw_value()
    }

    pub fn sensor_value(&self) -> &SensorValue {
        &self.value
    }

    pub fn thresholds(&self) -> &ThresholdSet {
        &self.thresholds
    }

    pub fn availability(&self) -> &AvailabilityTracker {
        &self.availability
    }

    pub fn is_functional(&self) -> bool {
        self.availability.is_functional()
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    pub fn error_count(&self) -> usize {
        self.availability.error_count()
    }

    pub fn override_state(&self) -> OverrideState {
        self.override_state
    }

    pub fn is_overridden(&self) -> bool {
        self.override_state.overridden
    }

    pub fn participates_in_thresholds(&self) -> bool {
        self.participates_in_thresholds
    }

    pub fn instrumentation(&self) -> Option<&Instrumentation> {
        self.instrumentation.as_ref()
    }

    pub fn power_status(&self) -> &PowerStatus {
        &self.context.power
    }

    /// Full property surface as it would be registered now
    pub fn properties(&self) -> SensorProperties {
        SensorProperties {
            unit: self.identity.units.clone(),
            value: self.value.value(),
            max_value: self.value.max_value(),
            min_value: self.value.min_value(),
            thresholds: self.thresholds.snapshot(),
            available: self.availability.is_available(),
            functional: self.availability.is_functional(),
            mutable: self.mutable.then_some(true),
            association: Some(Association::inventory(&self.identity.configuration_path)),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn publish(&self, property: Property) {
        self.context
            .publisher
            .publish(&self.identity.object_path, property);
    }

    /// Internal publish of a reading, filtered by the publish band
    fn publish_value(&mut self, new_value: f64) {
        if !self.value.requires_update(new_value) {
            return;
        }
        self.override_state.internal_set = true;
        self.write_value_property(new_value);
        self.override_state.internal_set = false;
    }

    /// Setter shared by internal publishes and external writes
    fn write_value_property(&mut self, new_value: f64) {
        if !self.override_state.internal_set {
            self.override_state.overridden = true;
        } else if self.override_state.overridden {
            return;
        }

        self.value.set(new_value);
        self.publish(Property::Value(new_value));
        if let Some((directory, key)) = self.directory.as_ref() {
            directory.update(key, new_value);
        }
    }
}

impl Drop for SensorCore {
    fn drop(&mut self) {
        if let Some((directory, key)) = self.directory.take() {
            directory.remove(&key);
        }
        if self.registered {
            self.context.publisher.unregister(&self.identity.object_path);
            debug!(sensor = %self.identity.name, "Sensor removed");
        }
    }
}

impl std::fmt::Debug for SensorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorCore")
            .field("identity", &self.identity)
            .field("value", &self.value)
            .field("thresholds", &self.thresholds)
            .field("availability", &self.availability)
            .field("override_state", &self.override_state)
            .finish_non_exhaustive()
    }
}
