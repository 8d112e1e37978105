//! Per-sensor read statistics for debugging flaky devices

use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct Instrumentation {
    pub collects_good: u64,
    pub collects_missed: u64,
    pub streak_good: u64,
    pub streak_missed: u64,
    pub min_collected: f64,
    pub max_collected: f64,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reading. Only streak changes and new extremes are logged.
    pub fn record(&mut self, sensor: &str, reading: f64) {
        if self.collects_good == 0 && self.collects_missed == 0 {
            debug!(sensor = %sensor, "First collection attempt");
        }

        if !reading.is_finite() {
            if self.streak_missed == 0 {
                debug!(
                    sensor = %sensor,
                    good = self.collects_good,
                    missed = self.collects_missed,
                    prior_good_streak = self.streak_good,
                    "Missing reading"
                );
            }
            self.streak_good = 0;
            self.collects_missed += 1;
            self.streak_missed += 1;
            return;
        }

        if self.streak_good == 0 && self.collects_good != 0 {
            debug!(
                sensor = %sensor,
                good = self.collects_good,
                missed = self.collects_missed,
                prior_miss_streak = self.streak_missed,
                "Recovered reading"
            );
        }

        if self.collects_good == 0 {
            debug!(sensor = %sensor, reading, "First reading");
            self.min_collected = reading;
            self.max_collected = reading;
        }

        self.streak_missed = 0;
        self.collects_good += 1;
        self.streak_good += 1;

        if reading < self.min_collected {
            debug!(sensor = %sensor, reading, "Lowest reading");
            self.min_collected = reading;
        }
        if reading > self.max_collected {
            debug!(sensor = %sensor, reading, "Highest reading");
            self.max_collected = reading;
        }
    }
}
