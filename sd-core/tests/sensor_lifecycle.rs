/*
 * Integration tests for the sensor lifecycle engine
 *
 * These drive SensorCore through its public surface and check what a bus
 * consumer would observe through the publisher.
 */

use std::rc::Rc;

use sd_core::{
    AccessPolicy, Direction, Level, MemoryPublisher, PowerState, PowerStatus, Property,
    SensorContext, SensorCore, SensorDefinition, SensorError, Threshold,
};
use sd_protocol::BusEvent;

const PATH: &str = "/xyz/openbmc_project/sensors/temperature/CPU0_Temp";

// Test utilities
fn definition(thresholds: Vec<Threshold>) -> SensorDefinition {
    SensorDefinition::new(
        "CPU0 Temp",
        "/xyz/openbmc_project/inventory/system/chassis/motherboard/CPU0_Temp",
        "XeonCPU",
        "DegreesC",
        -128.0,
        127.0,
    )
    .with_thresholds(thresholds)
}

fn sensor(def: SensorDefinition) -> (SensorCore, Rc<MemoryPublisher>) {
    let publisher = Rc::new(MemoryPublisher::new());
    let core = SensorCore::new(def, SensorContext::new(publisher.clone())).unwrap();
    (core, publisher)
}

fn functional_changes(publisher: &MemoryPublisher) -> Vec<bool> {
    publisher
        .property_changes(PATH, "Functional")
        .into_iter()
        .filter_map(|p| match p {
            Property::Functional(f) => Some(f),
            _ => None,
        })
        .collect()
}

fn available_changes(publisher: &MemoryPublisher) -> Vec<bool> {
    publisher
        .property_changes(PATH, "Available")
        .into_iter()
        .filter_map(|p| match p {
            Property::Available(a) => Some(a),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Publish filter
// ============================================================================

#[test]
fn test_repeated_value_publishes_once() {
    let (mut core, publisher) = sensor(definition(vec![]));
    for v in [42.0, -7.5, 126.9] {
        publisher.clear();
        core.update_value(v);
        core.update_value(v);
        assert_eq!(publisher.values(PATH), vec![v], "value {}", v);
    }
}

#[test]
fn test_nan_always_publishes() {
    let (mut core, publisher) = sensor(definition(vec![]));
    core.update_value(40.0);
    publisher.clear();

    // Every loss is reported, even when the value is already NaN
    core.update_value(f64::NAN);
    core.update_value(f64::NAN);
    let values = publisher.values(PATH);
    assert_eq!(values.len(), 2);
    assert!(values.iter().all(|v| v.is_nan()));

    // Recovery from NaN always publishes, however small the change
    core.update_value(40.0);
    assert_eq!(publisher.values(PATH).len(), 3);
}

#[test]
fn test_changes_inside_publish_band_suppressed() {
    let (mut core, publisher) = sensor(definition(vec![]));
    // Range 255 gives a publish band of 0.0255
    core.update_value(50.0);
    core.update_value(50.02);
    core.update_value(50.05);
    assert_eq!(publisher.values(PATH), vec![50.0, 50.05]);
}

// ============================================================================
// Thresholds
// ============================================================================

#[test]
fn test_critical_high_edge_count() {
    let (mut core, publisher) = sensor(definition(vec![
        Threshold::new(Level::Critical, Direction::High, 80.0).with_hysteresis(2.0),
    ]));

    for v in [70.0, 81.0, 82.0, 79.0, 77.0] {
        core.update_value(v);
    }

    assert_eq!(publisher.alarms(PATH, "CriticalAlarmHigh"), vec![true, false]);
}

#[test]
fn test_warning_high_round_trip() {
    let (mut core, publisher) = sensor(definition(vec![
        Threshold::new(Level::Warning, Direction::High, 80.0).with_hysteresis(2.0),
    ]));

    core.update_value(30.0);
    assert!(publisher.alarms(PATH, "WarningAlarmHigh").is_empty());

    core.update_value(85.0);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmHigh"), vec![true]);

    // 78 sits exactly on trigger - hysteresis and clears
    core.update_value(78.0);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmHigh"), vec![true, false]);

    core.update_value(77.0);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmHigh"), vec![true, false]);
    assert_eq!(publisher.values(PATH), vec![30.0, 85.0, 78.0, 77.0]);
}

#[test]
fn test_all_levels_evaluated_independently() {
    let (mut core, publisher) = sensor(definition(vec![
        Threshold::new(Level::Warning, Direction::High, 70.0).with_hysteresis(1.0),
        Threshold::new(Level::Critical, Direction::High, 80.0).with_hysteresis(1.0),
        Threshold::new(Level::HardShutdown, Direction::High, 100.0).with_hysteresis(1.0),
        Threshold::new(Level::Warning, Direction::Low, 5.0).with_hysteresis(1.0),
    ]));

    core.update_value(90.0);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmHigh"), vec![true]);
    assert_eq!(publisher.alarms(PATH, "CriticalAlarmHigh"), vec![true]);
    assert!(publisher.alarms(PATH, "HardShutdownAlarmHigh").is_empty());

    core.update_value(0.0);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmHigh"), vec![true, false]);
    assert_eq!(publisher.alarms(PATH, "CriticalAlarmHigh"), vec![true, false]);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmLow"), vec![true]);
}

#[test]
fn test_threshold_edit_forces_fresh_comparison() {
    let (mut core, publisher) = sensor(definition(vec![
        Threshold::new(Level::Warning, Direction::High, 80.0).with_hysteresis(2.0),
    ]));

    core.update_value(75.0);
    core.set_threshold_value(Level::Warning, Direction::High, 70.0).unwrap();
    assert!(publisher.alarms(PATH, "WarningAlarmHigh").is_empty());

    // Same reading as before, but the cache was dropped so it is re-evaluated
    core.update_value(75.0);
    assert_eq!(publisher.alarms(PATH, "WarningAlarmHigh"), vec![true]);
    assert_eq!(
        publisher.property_changes(PATH, "WarningHigh"),
        vec![Property::Threshold { name: "WarningHigh".into(), value: 70.0 }]
    );
}

// ============================================================================
// Error escalation
// ============================================================================

#[test]
fn test_four_errors_then_good_read_stays_functional() {
    let (mut core, publisher) = sensor(definition(vec![]));
    for _ in 0..4 {
        core.increment_error();
    }
    core.update_value(35.0);

    assert!(core.is_functional());
    assert_eq!(core.error_count(), 0);
    assert!(functional_changes(&publisher).is_empty());
}

#[test]
fn test_five_errors_escalate_exactly_once() {
    let (mut core, publisher) = sensor(definition(vec![]));
    core.update_value(35.0);

    for _ in 0..5 {
        core.increment_error();
    }
    assert!(!core.is_functional());
    assert!(core.value().is_nan());
    assert_eq!(functional_changes(&publisher), vec![false]);

    for _ in 0..10 {
        core.increment_error();
    }
    assert_eq!(functional_changes(&publisher), vec![false]);

    // Recovery is immediate on the next good reading
    core.update_value(36.0);
    assert!(core.is_functional());
    assert_eq!(functional_changes(&publisher), vec![false, true]);
}

#[test]
fn test_configured_error_threshold() {
    let mut def = definition(vec![]);
    def.error_threshold = Some(2);
    let (mut core, _) = sensor(def);

    core.increment_error();
    assert!(core.is_functional());
    core.increment_error();
    assert!(!core.is_functional());
}

// ============================================================================
// Power gating
// ============================================================================

#[test]
fn test_power_off_forces_nan_and_unavailable() {
    let publisher = Rc::new(MemoryPublisher::new());
    let power = PowerStatus::new();
    let ctx = SensorContext::new(publisher.clone()).with_power(power.clone());
    let mut core = SensorCore::new(definition(vec![]).with_power_state(PowerState::On), ctx).unwrap();

    core.update_value(42.0);
    core.update_value(42.0);
    assert!(core.value().is_nan());
    assert!(core.properties().value.is_nan());
    assert!(!core.is_available());
    assert_eq!(available_changes(&publisher), vec![false]);
    let values = publisher.values(PATH);
    assert_eq!(values.len(), 2);
    assert!(values.iter().all(|v| v.is_nan()));
    publisher.clear();

    power.set_power_on(true);
    core.update_value(42.0);
    assert_eq!(core.value(), 42.0);
    assert!(core.is_available());

    power.set_power_on(false);
    core.update_value(43.0);
    let values = publisher.values(PATH);
    assert_eq!(values.len(), 2);
    assert_eq!(values[0], 42.0);
    assert!(values[1].is_nan());
    assert_eq!(available_changes(&publisher), vec![true, false]);
}

#[test]
fn test_errors_not_counted_while_gated() {
    let publisher = Rc::new(MemoryPublisher::new());
    let ctx = SensorContext::new(publisher.clone());
    let mut core =
        SensorCore::new(definition(vec![]).with_power_state(PowerState::BiosPost), ctx).unwrap();

    for _ in 0..10 {
        core.increment_error();
    }
    assert_eq!(core.error_count(), 0);
    assert!(core.is_functional());
    assert!(!core.is_available());
}

// ============================================================================
// Override
// ============================================================================

#[test]
fn test_override_wins_until_cleared() {
    let (mut core, publisher) = sensor(definition(vec![]).settable(true));
    core.update_value(30.0);

    core.set_sensor_value(55.0).unwrap();
    assert!(core.is_overridden());

    // Overrides do not expire; polled readings stay inert
    for v in [31.0, 32.0, 90.0, f64::NAN] {
        core.update_value(v);
    }
    assert_eq!(core.value(), 55.0);
    assert_eq!(publisher.values(PATH), vec![30.0, 55.0]);

    core.clear_override();
    core.update_value(32.0);
    assert!(!core.is_overridden());
    assert_eq!(publisher.values(PATH), vec![30.0, 55.0, 32.0]);
}

#[test]
fn test_override_checks_thresholds_and_runs_hook() {
    let (mut core, publisher) = sensor(
        definition(vec![Threshold::new(Level::Critical, Direction::High, 90.0)]).settable(true),
    );
    let seen = Rc::new(std::cell::Cell::new(f64::NAN));
    let hook_seen = seen.clone();
    core.set_external_set_hook(Box::new(move |v| hook_seen.set(v)));

    core.set_sensor_value(95.0).unwrap();
    assert_eq!(publisher.alarms(PATH, "CriticalAlarmHigh"), vec![true]);
    assert_eq!(seen.get(), 95.0);
}

#[test]
fn test_override_denied_without_permission() {
    let publisher = Rc::new(MemoryPublisher::new());
    let access = AccessPolicy::new();
    let ctx = SensorContext::new(publisher.clone()).with_access(access.clone());
    let mut core = SensorCore::new(definition(vec![]), ctx).unwrap();
    core.update_value(30.0);

    let err = core.set_sensor_value(99.0).unwrap_err();
    assert!(matches!(err, SensorError::PermissionDenied(_)));
    assert!(!core.is_overridden());
    assert_eq!(core.value(), 30.0);
    assert_eq!(publisher.values(PATH), vec![30.0]);

    access.set_manufacturing_mode(true);
    core.set_sensor_value(99.0).unwrap();
    assert_eq!(core.value(), 99.0);
}

// ============================================================================
// Construction and teardown
// ============================================================================

#[test]
fn test_bad_definition_publishes_nothing() {
    let bad = [
        definition(vec![
            Threshold::new(Level::Warning, Direction::High, 80.0),
            Threshold::new(Level::Warning, Direction::High, 85.0),
        ]),
        definition(vec![Threshold::new(Level::Warning, Direction::High, f64::INFINITY)]),
        SensorDefinition::new("x", "/cfg/x", "T", "Furlongs", 0.0, 1.0),
        SensorDefinition::new("x", "/cfg/x", "T", "Volts", 5.0, 1.0),
        SensorDefinition::new("", "/cfg/x", "T", "Volts", 0.0, 1.0),
    ];

    for def in bad {
        let publisher = Rc::new(MemoryPublisher::new());
        let result = SensorCore::new(def, SensorContext::new(publisher.clone()));
        assert!(result.is_err());
        assert!(publisher.events().is_empty());
    }
}

#[test]
fn test_drop_unregisters() {
    let (core, publisher) = sensor(definition(vec![]));
    assert!(publisher.is_registered(PATH));
    drop(core);
    assert!(matches!(
        publisher.events().last(),
        Some(BusEvent::Removed { path }) if path == PATH
    ));
}
