//! Lightweight elapsed-time measurement.
//!
//! Control cycles are short; the only timing we care about is whether a
//! bookkeeping pass over many consumers starts to take noticeable time. The
//! timer reports through `tracing` at debug level and only when asked.

use std::time::Instant;

/// Operations slower than this are always worth a debug line.
pub const SLOW_OPERATION_MS: f64 = 10.0;

/// Consumer lists longer than this are always worth a debug line.
pub const LARGE_CONSUMER_SET: usize = 10;

/// A simple timer that measures elapsed time.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    /// Elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Stop the timer and log the result when the operation was slow or
    /// covered a large item set. Returns the elapsed milliseconds.
    pub fn stop_and_log(self, items: usize) -> f64 {
        let elapsed_ms = self.elapsed_ms();
        if items > LARGE_CONSUMER_SET || elapsed_ms > SLOW_OPERATION_MS {
            tracing::debug!(
                operation = self.label,
                items,
                elapsed_ms,
                avg_ms = elapsed_ms / items.max(1) as f64,
                "performance"
            );
        }
        elapsed_ms
    }
}
