//! Time sources for sampled controllers.
//!
//! Controllers measure the time between calls instead of being told a fixed
//! sample period, because the host scheduler is allowed to jitter. Timestamps
//! are seconds on a monotonic scale with an arbitrary origin.

use std::time::Instant;

/// Monotonic time source.
pub trait Clock {
    /// Seconds since an arbitrary, fixed origin. Never decreases.
    fn now(&self) -> f64;
}

/// Wall-clock backed monotonic time (`std::time::Instant`).
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Caller-driven clock for simulation and deterministic tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ManualClock {
    now: f64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: start }
    }

    /// Move time forward. Negative steps are ignored to keep the clock monotonic.
    pub fn advance(&mut self, dt: f64) {
        if dt > 0.0 {
            self.now += dt;
        }
    }

    /// Jump to an absolute time, never backwards.
    pub fn set(&mut self, t: f64) {
        self.now = self.now.max(t);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now
    }
}
