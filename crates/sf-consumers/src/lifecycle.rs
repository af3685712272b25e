//! Per-consumer start/stop state machine.
//!
//! `Idle -> Starting -> Active -> Stopping -> Idle`. Commands move a consumer
//! into `Starting`/`Stopping`; physical feedback confirms the transition into
//! `Active`/`Idle`. The start and stop delays are hysteresis guards: a
//! consumer that just stopped stays idle for at least the start delay before
//! it may be started again, and a consumer that just became active runs for
//! at least the stop delay before it may be stopped.

use serde::{Deserialize, Serialize};
use sf_core::numeric::Real;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerPhase {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl ConsumerPhase {
    /// Starting or active: the consumer has been asked to draw power.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Starting | Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsumerLifecycle {
    phase: ConsumerPhase,
    /// Time the current phase was entered; `None` for a never-used consumer.
    entered_at: Option<Real>,
}

impl ConsumerLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> ConsumerPhase {
        self.phase
    }

    /// Seconds spent in the current phase.
    pub fn time_in_phase(&self, now: Real) -> Option<Real> {
        self.entered_at.map(|t| (now - t).max(0.0))
    }

    fn held_for(&self, now: Real, delay_s: Real) -> bool {
        self.time_in_phase(now).is_none_or(|held| held >= delay_s)
    }

    fn enter(&mut self, phase: ConsumerPhase, now: Real) {
        tracing::trace!(from = ?self.phase, to = ?phase, "consumer phase change");
        self.phase = phase;
        self.entered_at = Some(now);
    }

    /// Begin starting. Allowed from `Idle` once idle for `start_delay_s`.
    pub fn try_start(&mut self, now: Real, start_delay_s: Real) -> bool {
        if self.phase == ConsumerPhase::Idle && self.held_for(now, start_delay_s) {
            self.enter(ConsumerPhase::Starting, now);
            true
        } else {
            false
        }
    }

    /// Begin stopping. Allowed from `Active` once active for `stop_delay_s`,
    /// and from `Starting` at any time (aborting a start).
    pub fn try_stop(&mut self, now: Real, stop_delay_s: Real) -> bool {
        let allowed = match self.phase {
            ConsumerPhase::Starting => true,
            ConsumerPhase::Active => self.held_for(now, stop_delay_s),
            ConsumerPhase::Idle | ConsumerPhase::Stopping => false,
        };
        if allowed {
            self.enter(ConsumerPhase::Stopping, now);
        }
        allowed
    }

    /// Apply feedback: confirm a pending start or stop.
    pub fn observe(&mut self, now: Real, finished_starting: bool, finished_stopping: bool) {
        match self.phase {
            ConsumerPhase::Starting if finished_starting => self.enter(ConsumerPhase::Active, now),
            ConsumerPhase::Stopping if finished_stopping => self.enter(ConsumerPhase::Idle, now),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_consumer_starts_immediately() {
        let mut lifecycle = ConsumerLifecycle::new();
        assert!(lifecycle.try_start(0.0, 60.0));
        assert_eq!(lifecycle.phase(), ConsumerPhase::Starting);
        assert!(!lifecycle.try_start(1.0, 0.0));
    }

    #[test]
    fn full_cycle_honours_delays() {
        let mut lifecycle = ConsumerLifecycle::new();
        assert!(lifecycle.try_start(0.0, 30.0));

        lifecycle.observe(5.0, false, false);
        assert_eq!(lifecycle.phase(), ConsumerPhase::Starting);
        lifecycle.observe(10.0, true, false);
        assert_eq!(lifecycle.phase(), ConsumerPhase::Active);

        assert!(!lifecycle.try_stop(40.0, 60.0));
        assert_eq!(lifecycle.phase(), ConsumerPhase::Active);
        assert!(lifecycle.try_stop(70.0, 60.0));
        assert_eq!(lifecycle.phase(), ConsumerPhase::Stopping);

        lifecycle.observe(75.0, false, true);
        assert_eq!(lifecycle.phase(), ConsumerPhase::Idle);

        assert!(!lifecycle.try_start(90.0, 30.0));
        assert!(lifecycle.try_start(105.0, 30.0));
    }

    #[test]
    fn start_can_be_aborted() {
        let mut lifecycle = ConsumerLifecycle::new();
        lifecycle.try_start(0.0, 0.0);
        assert!(lifecycle.try_stop(0.5, 600.0));
        assert_eq!(lifecycle.phase(), ConsumerPhase::Stopping);
    }

    #[test]
    fn idle_and_stopping_cannot_stop() {
        let mut lifecycle = ConsumerLifecycle::new();
        assert!(!lifecycle.try_stop(0.0, 0.0));
        lifecycle.try_start(0.0, 0.0);
        lifecycle.try_stop(0.0, 0.0);
        assert!(!lifecycle.try_stop(100.0, 0.0));
    }
}
