//! Hardware-facing pieces: reading sources, the poll loop and GPIO leases

mod gpio;
mod poller;
mod source;

pub use gpio::{LineCache, LineLease};
pub use poller::{spawn_poller, PollHandle, PollSchedule, SharedSensor};
pub use source::{split_file_name, units_for_hwmon_type, HwmonFileSource, Reading, ReadingSource};
