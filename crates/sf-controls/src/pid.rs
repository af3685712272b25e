//! PID controller with back-calculation anti-windup.
//!
//! Features:
//! - Derivative on measurement (no kick when the setpoint jumps)
//! - Output clamping and optional rate limiting
//! - Conditional integration: new error only accumulates while the output
//!   tracks the unclamped request
//! - Back-calculation correction `kaw * (output - u_pid)` bleeding the
//!   integral toward the achievable output
//! - Self-reset after persistent saturation and after repeated integral sign
//!   flips (limit cycles around a clamp boundary)

use crate::clock::{Clock, MonotonicClock};
use crate::error::{ControlError, ControlResult};
use serde::{Deserialize, Serialize};
use sf_core::ensure_finite;

/// Floor for `kp` when deriving the anti-windup coefficient.
pub const KAW_KP_FLOOR: f64 = 0.001;
/// Smallest `dt` once a previous sample exists (clock granularity).
pub const MIN_DT: f64 = 1e-6;
/// Below this `dt` the derivative is considered meaningless and skipped.
pub const MIN_DERIVATIVE_DT: f64 = 1e-4;
/// Saturated or rate-limited cycles tolerated before the integral is dropped.
pub const SATURATION_RESET_CYCLES: u32 = 10;
/// Consecutive integral sign flips that zero the integral.
pub const OSCILLATION_RESET_FLIPS: u32 = 3;
/// Integral bound as a multiple of the output range.
pub const INTEGRAL_RANGE_FACTOR: f64 = 2.0;

/// PID tuning snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (per second).
    pub ki: f64,
    /// Derivative gain (seconds).
    pub kd: f64,
    /// Lower output clamp.
    pub min_output: f64,
    /// Upper output clamp.
    pub max_output: f64,
}

impl PidConfig {
    pub fn new(kp: f64, ki: f64, kd: f64, min_output: f64, max_output: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            min_output,
            max_output,
        }
    }

    /// Check the configuration without rejecting it.
    ///
    /// The controller accepts any configuration; callers decide whether a
    /// failed check should block startup or only be logged.
    pub fn validate(&self) -> ControlResult<()> {
        for (what, value) in [
            ("kp", self.kp),
            ("ki", self.ki),
            ("kd", self.kd),
            ("min_output", self.min_output),
            ("max_output", self.max_output),
        ] {
            ensure_finite(value, what)?;
        }
        if self.min_output > self.max_output {
            return Err(ControlError::InvertedLimits {
                min: self.min_output,
                max: self.max_output,
            });
        }
        Ok(())
    }

    /// Width of the output band.
    pub fn output_range(&self) -> f64 {
        (self.max_output - self.min_output).abs()
    }

    fn clamp_output(&self, u: f64) -> f64 {
        u.min(self.max_output).max(self.min_output)
    }

    fn is_saturated(&self, u: f64) -> bool {
        u < self.min_output || u > self.max_output
    }
}

/// Maximum output change per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub enabled: bool,
    /// Output units per second.
    pub per_second: f64,
}

impl RateLimit {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn per_second(per_second: f64) -> Self {
        Self {
            enabled: true,
            per_second,
        }
    }

    /// A limit only applies when enabled with a positive rate.
    pub fn is_active(&self) -> bool {
        self.enabled && self.per_second > 0.0
    }
}

/// Controller memory carried between steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidState {
    /// Integral contribution, already multiplied by `ki`.
    pub integral: f64,
    pub prev_pv: Option<f64>,
    pub prev_time: Option<f64>,
    pub prev_error: Option<f64>,
    /// Integral after the previous update, for sign-flip detection.
    pub prev_integral: Option<f64>,
    pub saturation_count: u32,
    pub oscillation_count: u32,
    /// Back-calculation coefficient `1 / max(kp, KAW_KP_FLOOR)`.
    pub kaw: f64,
}

impl PidState {
    fn new(kp: f64) -> Self {
        Self {
            integral: 0.0,
            prev_pv: None,
            prev_time: None,
            prev_error: None,
            prev_integral: None,
            saturation_count: 0,
            oscillation_count: 0,
            kaw: anti_windup_gain(kp),
        }
    }

    fn clear(&mut self) {
        *self = Self {
            kaw: self.kaw,
            ..Self::new(0.0)
        };
    }

    fn forget_integral(&mut self) {
        self.integral = 0.0;
        self.prev_integral = None;
        self.saturation_count = 0;
        self.oscillation_count = 0;
    }
}

fn anti_windup_gain(kp: f64) -> f64 {
    1.0 / kp.max(KAW_KP_FLOOR)
}

fn sign_flipped(prev: f64, next: f64) -> bool {
    (prev > 0.0 && next < 0.0) || (prev < 0.0 && next > 0.0)
}

/// Details of one controller step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidStepResult {
    /// Clamped and rate-limited output.
    pub output: f64,
    pub error: f64,
    pub p_term: f64,
    /// Integral carried out of this step (used by the next step).
    pub i_term: f64,
    pub d_term: f64,
    /// Clamped output before rate limiting.
    pub output_pre_rate_limit: f64,
}

/// PID controller owning its state and time source.
#[derive(Debug, Clone)]
pub struct PidController<C: Clock = MonotonicClock> {
    config: PidConfig,
    state: PidState,
    clock: C,
}

impl PidController<MonotonicClock> {
    /// Controller timed by the process monotonic clock.
    pub fn new(config: PidConfig) -> Self {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> PidController<C> {
    pub fn with_clock(config: PidConfig, clock: C) -> Self {
        Self {
            state: PidState::new(config.kp),
            config,
            clock,
        }
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    pub fn state(&self) -> &PidState {
        &self.state
    }

    pub fn integral(&self) -> f64 {
        self.state.integral
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Replace gains and limits; accumulated state is kept.
    pub fn update_config(&mut self, config: PidConfig) {
        self.config = config;
        self.state.kaw = anti_windup_gain(config.kp);
    }

    /// Apply new runtime tuning without a reset (bumpless retune).
    pub fn apply_options(&mut self, config: PidConfig) {
        tracing::debug!(?config, "pid apply runtime options; no reset");
        self.update_config(config);
    }

    /// Drop the integral and all sample history.
    pub fn reset(&mut self) {
        self.state.clear();
    }

    /// Run one control step.
    ///
    /// `error` is supplied by the caller (normally `setpoint - pv`) so that
    /// deadband and sign conventions stay outside the controller. `pv` only
    /// feeds the derivative. `last_output` is the output actually applied in
    /// the previous cycle and anchors the rate limiter.
    pub fn step(
        &mut self,
        pv: f64,
        error: f64,
        last_output: Option<f64>,
        rate_limit: RateLimit,
    ) -> PidStepResult {
        let now = self.clock.now();
        let dt = self.elapsed(now);

        // Derivative on measurement: opposes a rising pv regardless of setpoint.
        let d_pv = match self.state.prev_pv {
            Some(prev_pv) if dt >= MIN_DERIVATIVE_DT => (pv - prev_pv) / dt,
            _ => 0.0,
        };

        let p_term = self.config.kp * error;
        let d_term = -self.config.kd * d_pv;
        let u_pid = p_term + self.state.integral + d_term;
        let u_sat = self.config.clamp_output(u_pid);

        let output = match last_output {
            Some(last) if rate_limit.is_active() && dt > 0.0 => {
                let max_delta = rate_limit.per_second * dt;
                u_sat.min(last + max_delta).max(last - max_delta)
            }
            _ => u_sat,
        };

        if dt > 0.0 {
            let saturated = self.config.is_saturated(u_pid);
            let rate_limited = output != u_sat;
            self.integrate(error, dt, u_pid, output, saturated || rate_limited);
        }

        self.state.prev_pv = Some(pv);
        self.state.prev_time = Some(now);
        self.state.prev_error = Some(error);

        PidStepResult {
            output,
            error,
            p_term,
            i_term: self.state.integral,
            d_term,
            output_pre_rate_limit: u_sat,
        }
    }

    /// Back-solve the integral so the next step reproduces `current_output`.
    ///
    /// Used when control authority returns to the controller (manual override
    /// released, controller re-enabled). With `ki == 0` there is no integral
    /// term to solve for and it is cleared.
    pub fn bumpless_transfer(&mut self, current_output: f64, error: f64, pv: Option<f64>) {
        let now = self.clock.now();
        let dt = self.elapsed(now);

        let d_term = match (pv, self.state.prev_pv) {
            (Some(pv), Some(prev_pv)) if dt > 0.0 => -self.config.kd * (pv - prev_pv) / dt,
            _ => 0.0,
        };

        self.state.integral = if self.config.ki != 0.0 {
            current_output - self.config.kp * error - d_term
        } else {
            0.0
        };
        self.state.prev_integral = None;
        self.state.oscillation_count = 0;
        self.state.saturation_count = 0;

        tracing::debug!(
            current_output,
            integral = self.state.integral,
            "pid bumpless transfer"
        );

        self.state.prev_pv = pv;
        self.state.prev_time = Some(now);
        self.state.prev_error = Some(error);
    }

    fn elapsed(&self, now: f64) -> f64 {
        match self.state.prev_time {
            None => 0.0,
            Some(prev) => (now - prev).max(MIN_DT),
        }
    }

    fn integrate(&mut self, error: f64, dt: f64, u_pid: f64, output: f64, held: bool) {
        let state = &mut self.state;

        if held {
            state.saturation_count += 1;
        } else {
            state.saturation_count = 0;
        }

        if state.saturation_count > SATURATION_RESET_CYCLES {
            tracing::debug!(
                cycles = state.saturation_count,
                "pid output held at limit; dropping integral"
            );
            state.forget_integral();
            return;
        }

        // Zero while the output tracks the unclamped request.
        let correction = state.kaw * (output - u_pid) * dt;
        let update = if held {
            correction
        } else {
            self.config.ki * error * dt + correction
        };
        let next = state.integral + update;

        // A NaN bound would make `clamp` panic.
        let next = if next.is_finite() { next } else { 0.0 };
        let range = self.config.output_range();
        if !range.is_finite() || range <= 0.0 {
            state.integral = next;
            state.prev_integral = Some(next);
            return;
        }

        let limit = range * INTEGRAL_RANGE_FACTOR;
        let clamped = next.clamp(-limit, limit);

        match state.prev_integral {
            Some(prev) if sign_flipped(prev, next) => {
                state.oscillation_count += 1;
                if state.oscillation_count >= OSCILLATION_RESET_FLIPS {
                    tracing::debug!("pid integral oscillating; dropping integral");
                    state.integral = 0.0;
                    state.oscillation_count = 0;
                    state.prev_integral = None;
                } else {
                    state.integral = clamped;
                    state.prev_integral = Some(clamped);
                }
            }
            Some(_) => {
                state.oscillation_count = 0;
                state.integral = clamped;
                state.prev_integral = Some(clamped);
            }
            None => {
                state.integral = clamped;
                state.prev_integral = Some(clamped);
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn p_only_first_step_is_clamped_proportional(
            kp in 0.001_f64..50.0,
            error in -500.0_f64..500.0,
            min in -100.0_f64..0.0,
            span in 0.0_f64..200.0,
        ) {
            let config = PidConfig::new(kp, 0.0, 0.0, min, min + span);
            let mut pid = PidController::with_clock(config, ManualClock::new(0.0));
            let result = pid.step(0.0, error, None, RateLimit::disabled());
            prop_assert_eq!(result.output, (kp * error).min(min + span).max(min));
        }

        #[test]
        fn integral_stays_bounded(
            kp in 0.0_f64..10.0,
            ki in 0.0_f64..1000.0,
            kd in 0.0_f64..5.0,
            errors in prop::collection::vec(-1000.0_f64..1000.0, 100..150),
            dt in 0.0005_f64..2.0,
        ) {
            let config = PidConfig::new(kp, ki, kd, 0.0, 100.0);
            let limit = INTEGRAL_RANGE_FACTOR * config.output_range();
            let mut pid = PidController::with_clock(config, ManualClock::new(0.0));
            let mut last = None;
            for (i, error) in errors.iter().enumerate() {
                let result = pid.step(i as f64, *error, last, RateLimit::disabled());
                prop_assert!(pid.integral().abs() <= limit + 1e-9);
                prop_assert!(result.output >= 0.0 && result.output <= 100.0);
                last = Some(result.output);
                pid.clock_mut().advance(dt);
            }
        }

        #[test]
        fn rate_limited_output_moves_at_most_rate_times_dt(
            rate in 0.1_f64..50.0,
            errors in prop::collection::vec(-200.0_f64..200.0, 2..60),
            dt in 0.01_f64..5.0,
        ) {
            let config = PidConfig::new(2.0, 0.5, 0.0, 0.0, 100.0);
            let mut pid = PidController::with_clock(config, ManualClock::new(0.0));
            let limit = RateLimit::per_second(rate);
            let mut last = pid.step(0.0, 0.0, None, limit).output;
            for error in errors {
                pid.clock_mut().advance(dt);
                let result = pid.step(0.0, error, Some(last), limit);
                prop_assert!((result.output - last).abs() <= rate * dt + 1e-9);
                last = result.output;
            }
        }
    }
}
