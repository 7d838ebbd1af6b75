//! Frame clock used for cycle pacing and periodic statistics.

use std::time::{Duration, Instant};

/// Tracks elapsed time, per-tick deltas and the ticks since the last report.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    last_report: Instant,
    ticks_since_report: u64,
}

impl FrameClock {
    /// Starts the clock now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            last_report: now,
            ticks_since_report: 0,
        }
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Records one cycle and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.ticks_since_report += 1;
        delta
    }

    /// Returns the average cycle rate since the last report once `interval` has passed.
    ///
    /// Resets the report window when it fires.
    pub fn report_due(&mut self, interval: Duration) -> Option<f64> {
        let now = Instant::now();
        let window = now - self.last_report;
        if window < interval {
            return None;
        }

        let rate = self.ticks_since_report as f64 / window.as_secs_f64().max(f64::EPSILON);
        self.last_report = now;
        self.ticks_since_report = 0;
        Some(rate)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_monotonic() {
        let mut clock = FrameClock::new();
        std::thread::sleep(Duration::from_millis(2));
        let delta = clock.tick();
        assert!(delta >= Duration::from_millis(2));
        assert!(clock.elapsed() >= delta);
    }

    #[test]
    fn test_report_due_waits_for_interval() {
        let mut clock = FrameClock::new();
        clock.tick();
        assert!(clock.report_due(Duration::from_secs(3600)).is_none());

        let rate = clock.report_due(Duration::ZERO);
        assert!(rate.is_some_and(|r| r > 0.0));

        // Window was reset, no ticks since.
        assert_eq!(clock.report_due(Duration::ZERO), Some(0.0));
    }
}
