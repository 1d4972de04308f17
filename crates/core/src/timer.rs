//! Wall-clock timing for the frame loop.

use std::time::{Duration, Instant};

/// Measures time between frame ticks.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    ticks: u64,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            ticks: 0,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Total time since the timer was created, in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Wall-clock time since the previous tick.
    ///
    /// The value is never capped, so a tick after a suspension reports the
    /// whole suspended span.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.ticks += 1;
        delta
    }

    /// [`tick`](Self::tick) in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Number of ticks taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.ticks(), 2);
    }

    #[test]
    fn test_delta_reports_full_gap() {
        let mut timer = Timer::new();
        timer.last_tick = Instant::now() - Duration::from_secs(5);
        assert!(timer.tick() >= Duration::from_secs(5));
    }

    #[test]
    fn test_delta_secs_after_sleep() {
        let mut timer = Timer::new();
        timer.tick();
        std::thread::sleep(Duration::from_millis(400));
        let delta = timer.delta_secs();
        assert!(delta >= 0.4, "delta was {delta}");
    }

    #[test]
    fn test_delta_resets_each_tick() {
        let mut timer = Timer::new();
        timer.last_tick = Instant::now() - Duration::from_secs(5);
        timer.tick();
        assert!(timer.tick() < Duration::from_secs(5));
    }
}
