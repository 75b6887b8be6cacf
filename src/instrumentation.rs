//! Timing and logging helpers shared by every planner: `Timer::default()` /
//! `dur_ms()` bracket a planner pass the same way around every planner
//! family in this crate.

use std::time::Instant;

pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Timer {
            start: Instant::now(),
        }
    }
}

impl Timer {
    pub fn dur_ms(&mut self) -> f64 {
        let d = self.start.elapsed();
        let ms = d.as_secs() as f64 * 1000. + f64::from(d.subsec_nanos()) / 1_000_000.;
        self.start = Instant::now();
        ms
    }
}

/// Initializes the `log`/`pretty_env_logger` backend exactly once. Safe to call
/// from multiple tests; subsequent calls are no-ops.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}
