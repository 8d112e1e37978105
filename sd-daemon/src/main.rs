//! sensord
//!
//! Hardware monitoring daemon for a BMC. Loads sensor definitions, polls
//! hwmon attributes on a single-threaded event loop and publishes values and
//! threshold alarms.
//!
//! # Signals
//! - **SIGINT / SIGTERM**: drain every poller, unregister sensors, exit
//! - **SIGHUP**: reload the sensor configuration

mod sensors;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use sd_core::constants::{limits, paths};
use sd_core::{
    load_sensor_configs, AccessPolicy, BroadcastPublisher, JsonThresholdStore, PowerStatus,
    Publisher, SensorContext, SensorDirectory, ThresholdStore,
};
use sd_protocol::{BusEvent, Property};

use crate::sensors::SensorSet;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct Options {
    config: PathBuf,
    thresholds: PathBuf,
    power_on: bool,
    post_complete: bool,
    manufacturing: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            config: PathBuf::from(paths::SENSOR_CONFIG),
            thresholds: PathBuf::from(paths::THRESHOLD_STORE),
            power_on: false,
            post_complete: false,
            manufacturing: false,
        }
    }
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("sensord {} - BMC sensor daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    sensord [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH       Sensor configuration (default {})", paths::SENSOR_CONFIG);
    eprintln!("    -t, --thresholds PATH   Persisted threshold edits (default {})", paths::THRESHOLD_STORE);
    eprintln!("        --power-on          Start with chassis power reported on");
    eprintln!("        --post-complete     Start with BIOS POST reported complete");
    eprintln!("        --manufacturing     Allow value overrides on every sensor");
    eprintln!("    -v, --version           Print version");
    eprintln!("    -h, --help              Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    SENSORD_LOG             Log filter (trace, debug, info, warn, error)");
}

/// `Ok(None)` means help or version was printed
fn parse_args(args: &[String]) -> Result<Option<Options>> {
    let mut opts = Options::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-v" | "--version" => {
                println!("sensord {}", VERSION);
                return Ok(None);
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).context("--config requires a path argument")?;
                opts.config = PathBuf::from(path);
            }
            "-t" | "--thresholds" => {
                i += 1;
                let path = args.get(i).context("--thresholds requires a path argument")?;
                opts.thresholds = PathBuf::from(path);
            }
            "--power-on" => opts.power_on = true,
            "--post-complete" => opts.post_complete = true,
            "--manufacturing" => opts.manufacturing = true,
            arg => anyhow::bail!("unknown argument: {}", arg),
        }
        i += 1;
    }
    Ok(Some(opts))
}

// ============================================================================
// Logging
// ============================================================================

/// journald when the journal socket exists, stdout otherwise
fn init_logging() -> bool {
    let filter = std::env::var("SENSORD_LOG").unwrap_or_else(|_| "info".to_string());

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald)
                    .with(tracing_subscriber::EnvFilter::new(&filter))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&filter)
        .init();
    false
}

// ============================================================================
// Event log
// ============================================================================

/// Log alarm and health edges seen on the bus
async fn log_bus_events(publisher: Rc<BroadcastPublisher>) {
    let mut rx = publisher.subscribe();
    drop(publisher);

    loop {
        match rx.recv().await {
            Ok(envelope) => match envelope.event {
                BusEvent::PropertyChanged {
                    path,
                    property: Property::Alarm { name, asserted },
                } => {
                    info!(seq = envelope.seq, path = %path, alarm = %name, asserted, "Alarm edge");
                }
                BusEvent::PropertyChanged {
                    path,
                    property: Property::Functional(functional),
                } => {
                    info!(seq = envelope.seq, path = %path, functional, "Functional changed");
                }
                BusEvent::Registered { path, .. } => debug!(path = %path, "Object added"),
                BusEvent::Removed { path } => debug!(path = %path, "Object removed"),
                BusEvent::PropertyChanged { .. } => {}
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Run loop
// ============================================================================

async fn reload(set: &mut SensorSet, config: &Path) {
    match load_sensor_configs(config) {
        Ok(configs) => {
            set.apply(configs).await;
        }
        Err(e) => {
            warn!("Config reload failed: {} - keeping existing sensors", e);
        }
    }
}

async fn run(opts: Options) -> Result<()> {
    let publisher = Rc::new(BroadcastPublisher::new(limits::EVENT_CHANNEL_CAPACITY));
    tokio::task::spawn_local(log_bus_events(Rc::clone(&publisher)));

    let power = PowerStatus::new();
    power.set_power_on(opts.power_on);
    power.set_post_complete(opts.post_complete);

    let access = AccessPolicy::new();
    access.set_manufacturing_mode(opts.manufacturing);
    if opts.manufacturing {
        warn!("Manufacturing mode: every sensor accepts value overrides");
    }

    let store = match JsonThresholdStore::open(&opts.thresholds) {
        Ok(store) => Some(Rc::new(store)),
        Err(e) => {
            warn!("Threshold store unavailable ({}), threshold edits will not persist", e);
            None
        }
    };

    let bus: Rc<dyn Publisher> = publisher;
    let mut context = SensorContext::new(bus).with_power(power).with_access(access);
    if let Some(store) = store.as_ref() {
        let store: Rc<dyn ThresholdStore> = Rc::clone(store) as Rc<dyn ThresholdStore>;
        context = context.with_threshold_store(store);
    }

    let configs = load_sensor_configs(&opts.config)
        .with_context(|| format!("loading sensor configuration {}", opts.config.display()))?;

    let mut set = SensorSet::new(context, store, SensorDirectory::new());
    set.apply(configs).await;
    info!("STARTUP: {} sensors live", set.len());

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGNAL: SIGINT received - shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGNAL: SIGTERM received - shutting down");
                break;
            }
            _ = sighup.recv() => {
                info!("SIGNAL: SIGHUP received - reloading configuration");
                reload(&mut set, &opts.config).await;
            }
        }
    }

    set.shutdown().await;
    info!("SHUTDOWN: all sensors drained");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let opts = match parse_args(&args) {
        Ok(Some(opts)) => opts,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let journald = init_logging();
    info!("STARTUP: sensord {} starting", VERSION);
    info!("STARTUP: Logging to {}", if journald { "systemd journal" } else { "stdout" });
    info!("STARTUP: Config: {}", opts.config.display());

    let local = tokio::task::LocalSet::new();
    let result = local.run_until(run(opts)).await;
    if let Err(e) = &result {
        error!("sensord failed: {:#}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("sensord")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_defaults() {
        let opts = parse_args(&args(&[])).unwrap().unwrap();
        assert_eq!(opts.config, PathBuf::from(paths::SENSOR_CONFIG));
        assert!(!opts.power_on);
    }

    #[test]
    fn test_parse_flags() {
        let opts = parse_args(&args(&["-c", "/tmp/s.json", "--power-on", "--manufacturing"]))
            .unwrap()
            .unwrap();
        assert_eq!(opts.config, PathBuf::from("/tmp/s.json"));
        assert!(opts.power_on);
        assert!(opts.manufacturing);
        assert!(!opts.post_complete);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args(&args(&["--config"])).is_err());
        assert!(parse_args(&args(&["--bogus"])).is_err());
    }
}
