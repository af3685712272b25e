//! One controller entry: PID loop plus surplus distribution.
//!
//! Each [`ControllerEntry::cycle`] reads the process value and setpoint,
//! steps the PID, and turns the output into per-consumer commands:
//!
//! 1. The output is normalized over `[min_output, max_output]` and scaled to
//!    the capacity of every enabled, available consumer (`max_power_w` for
//!    controlled consumers, `threshold_w` for binary ones).
//! 2. Priority tiers are served in ascending order, each tier splitting its
//!    budget evenly. Whatever a tier does not take flows to the next one.
//! 3. Controlled grants are rounded down to `step_w`; changes smaller than
//!    the deadband are ignored. Binary consumers switch on when their share
//!    reaches the threshold.
//! 4. Lifecycle gates apply the start and stop delays.
//!
//! The entry never writes to the state store. Commands are returned in the
//! [`CycleReport`] and the caller applies them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sf_consumers::{
    Consumer, ConsumerContext, ConsumerKind, ConsumerLifecycle, ConsumerManager, ConsumerPhase,
    ConsumerRuntime, EntityWarning, RegistryOverrides, RuntimeStore, StepRequest,
    ValidationReport,
};
use sf_controls::{Clock, ControlError, MonotonicClock, PidConfig, PidController, PidStepResult};
use sf_core::numeric::Real;
use sf_core::{StateStore, Timer};

use crate::config::{ControllerOptions, EntryConfig};
use crate::error::{AppError, AppResult};
use crate::options::{OptionsChange, classify_change};

/// Fraction of the commanded power a controlled consumer must draw before
/// its start counts as finished.
///
/// The reference is the last commanded power capped at `max_power_w`, not
/// `max_power_w` itself, so a consumer granted a partial share also finishes
/// starting once it draws that share.
pub const START_CONFIRM_FRACTION: Real = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CommandValue {
    /// Power setpoint for a controlled consumer (W).
    Power(Real),
    /// On/off for a binary consumer.
    Switch(bool),
}

impl CommandValue {
    pub fn is_on(&self) -> bool {
        match *self {
            Self::Power(w) => w > 0.0,
            Self::Switch(on) => on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerCommand {
    pub consumer_id: String,
    pub value: CommandValue,
    /// False when the command repeats the previous one.
    pub changed: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// PID stepped and surplus distributed.
    Stepped,
    /// Inputs unavailable; last output held, nothing commanded.
    Held,
    /// Controller switched off in the options.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub step: Option<PidStepResult>,
    /// Output in effect after this cycle.
    pub output: Real,
    /// Total power of enabled, available consumers (W).
    pub capacity_w: Real,
    /// Power handed out by the allocation before lifecycle gating (W).
    pub budget_w: Real,
    pub tiers: Vec<Real>,
    pub commands: Vec<ConsumerCommand>,
}

impl CycleReport {
    pub fn command(&self, consumer_id: &str) -> Option<&ConsumerCommand> {
        self.commands.iter().find(|c| c.consumer_id == consumer_id)
    }
}

/// Everything read about one consumer before any state is changed.
struct ConsumerInput<'c> {
    consumer: &'c Consumer,
    enabled: bool,
    available: bool,
    prev: ConsumerRuntime,
    capacity_w: Real,
    step_w: Real,
    deadband_pct: Real,
    threshold_w: Real,
    start_delay_s: Real,
    stop_delay_s: Real,
    finished_starting: bool,
    finished_stopping: bool,
}

impl ConsumerInput<'_> {
    fn eligible(&self) -> bool {
        self.enabled && self.available
    }
}

/// Outcome of a lifecycle check for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Run(&'static str),
    Off(&'static str),
    /// Keep the previous command.
    Hold(&'static str),
}

fn gate(
    lifecycle: &mut ConsumerLifecycle,
    now: Real,
    wants_power: bool,
    start_delay_s: Real,
    stop_delay_s: Real,
) -> Gate {
    let phase = lifecycle.phase();
    if wants_power {
        if phase.is_running() {
            Gate::Run("distributing surplus")
        } else if lifecycle.try_start(now, start_delay_s) {
            Gate::Run("starting")
        } else if phase == ConsumerPhase::Stopping {
            Gate::Off("stopping")
        } else {
            Gate::Off("waiting for start delay")
        }
    } else if !phase.is_running() {
        Gate::Off("insufficient surplus")
    } else if lifecycle.try_stop(now, stop_delay_s) {
        Gate::Off("stopping")
    } else {
        Gate::Hold("minimum run time")
    }
}

/// Output position within `[min, max]`, as a fraction.
fn output_fraction(output: Real, min: Real, max: Real) -> Real {
    let range = max - min;
    if range > 0.0 {
        ((output - min) / range).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn round_down_to_step(power_w: Real, step_w: Real) -> Real {
    if step_w > 0.0 {
        (power_w / step_w).floor() * step_w
    } else {
        power_w
    }
}

fn ensure_valid_consumers(manager: &ConsumerManager, consumers: &[Consumer]) -> AppResult<()> {
    let (is_valid, errors) = manager.validate_consumers(consumers).into_parts();
    if is_valid {
        Ok(())
    } else {
        Err(AppError::InvalidConsumers(errors))
    }
}

/// Tuning the controller can run with. Non-finite gains or limits are
/// refused; inverted limits are only logged.
fn checked_pid_config(entry_id: &str, options: &ControllerOptions) -> AppResult<PidConfig> {
    let pid_config = options.pid_config();
    match pid_config.validate() {
        Ok(()) => {}
        Err(err @ ControlError::NonFinite { .. }) => return Err(AppError::InvalidTuning(err)),
        Err(err) => {
            tracing::warn!(entry = entry_id, %err, "pid configuration is inconsistent");
        }
    }
    Ok(pid_config)
}

/// Controller instance for one configuration entry.
#[derive(Debug)]
pub struct ControllerEntry<C: Clock = MonotonicClock> {
    config: EntryConfig,
    pid: PidController<C>,
    manager: ConsumerManager,
    runtime: RuntimeStore,
    overrides: RegistryOverrides,
    lifecycles: HashMap<String, ConsumerLifecycle>,
    last_output: Option<Real>,
    resume_pending: bool,
}

impl ControllerEntry<MonotonicClock> {
    pub fn new(config: EntryConfig) -> AppResult<Self> {
        Self::with_clock(config, MonotonicClock::new())
    }
}

impl<C: Clock> ControllerEntry<C> {
    /// Build an entry, refusing an invalid consumer list.
    pub fn with_clock(config: EntryConfig, clock: C) -> AppResult<Self> {
        let manager = ConsumerManager::new(config.entry_id.clone());
        ensure_valid_consumers(&manager, &config.consumers)?;

        let pid_config = checked_pid_config(&config.entry_id, &config.options)?;

        tracing::debug!(
            entry = %config.entry_id,
            consumers = config.consumers.len(),
            "controller entry created"
        );
        Ok(Self {
            pid: PidController::with_clock(pid_config, clock),
            overrides: config.override_registry(),
            manager,
            runtime: RuntimeStore::new(),
            lifecycles: HashMap::new(),
            last_output: None,
            resume_pending: false,
            config,
        })
    }

    pub fn config(&self) -> &EntryConfig {
        &self.config
    }

    pub fn entry_id(&self) -> &str {
        &self.config.entry_id
    }

    pub fn pid(&self) -> &PidController<C> {
        &self.pid
    }

    pub fn clock_mut(&mut self) -> &mut C {
        self.pid.clock_mut()
    }

    pub fn runtime(&self) -> &RuntimeStore {
        &self.runtime
    }

    /// Runtime record of a consumer (defaults when never touched).
    pub fn consumer_runtime(&self, consumer_id: &str) -> ConsumerRuntime {
        self.runtime.snapshot(&self.config.entry_id, consumer_id)
    }

    pub fn consumer_phase(&self, consumer_id: &str) -> ConsumerPhase {
        self.lifecycles
            .get(consumer_id)
            .map(ConsumerLifecycle::phase)
            .unwrap_or_default()
    }

    pub fn last_output(&self) -> Option<Real> {
        self.last_output
    }

    /// Soft-enable or soft-disable a consumer.
    pub fn set_consumer_enabled(&mut self, consumer_id: &str, enabled: bool) {
        tracing::debug!(
            entry = %self.config.entry_id,
            consumer = consumer_id,
            enabled,
            "consumer enable changed"
        );
        self.runtime
            .set_enabled(&self.config.entry_id, consumer_id, enabled);
    }

    /// Entity accessibility of the configured consumers.
    pub fn check_entities(&self, states: &dyn StateStore) -> ValidationReport<EntityWarning> {
        let ctx = ConsumerContext::new(states, &self.runtime, &self.overrides);
        self.manager
            .validate_entity_accessibility(&self.config.consumers, &ctx)
    }

    /// Apply an updated configuration.
    ///
    /// Non-finite tuning, or a rewire with an invalid consumer list, is
    /// refused and leaves the entry untouched.
    pub fn apply_config(&mut self, new: EntryConfig) -> AppResult<OptionsChange> {
        if new.entry_id != self.config.entry_id {
            return Err(AppError::EntryMismatch {
                expected: self.config.entry_id.clone(),
                found: new.entry_id,
            });
        }

        let change = classify_change(&self.config, &new);
        match change {
            OptionsChange::Unchanged => {
                tracing::debug!(entry = %new.entry_id, "options unchanged; skipping handling");
            }
            OptionsChange::Retune => {
                let pid_config = checked_pid_config(&new.entry_id, &new.options)?;
                self.retune(&new.options, pid_config);
            }
            OptionsChange::Rewire => {
                ensure_valid_consumers(&self.manager, &new.consumers)?;
                let pid_config = checked_pid_config(&new.entry_id, &new.options)?;
                self.rewire(&new, pid_config);
            }
        }
        self.config = new;
        Ok(change)
    }

    fn retune(&mut self, options: &ControllerOptions, pid_config: PidConfig) {
        if options.enabled && !self.config.options.enabled {
            self.resume_pending = true;
        }
        self.pid.apply_options(pid_config);
    }

    fn rewire(&mut self, new: &EntryConfig, pid_config: PidConfig) {
        tracing::warn!(entry = %new.entry_id, "wiring change detected; rebuilding entry");
        self.pid.update_config(pid_config);
        self.pid.reset();
        let dropped = self.runtime.remove_entry(&new.entry_id);
        self.lifecycles.clear();
        self.manager.invalidate_cache();
        self.overrides = new.override_registry();
        self.last_output = None;
        self.resume_pending = false;
        tracing::debug!(entry = %new.entry_id, dropped, "consumer runtime cleared");
    }

    fn idle_report(&self, status: CycleStatus) -> CycleReport {
        CycleReport {
            status,
            step: None,
            output: self
                .last_output
                .unwrap_or(self.config.options.min_output),
            capacity_w: 0.0,
            budget_w: 0.0,
            tiers: Vec::new(),
            commands: Vec::new(),
        }
    }

    /// Run one control cycle against the current entity states.
    pub fn cycle(&mut self, states: &dyn StateStore) -> CycleReport {
        if !self.config.options.enabled {
            return self.idle_report(CycleStatus::Disabled);
        }

        let wiring = &self.config.wiring;
        let pv = states.number(&wiring.process_value_entity_id);
        let setpoint = states.number(&wiring.setpoint_entity_id);
        let (Some(pv), Some(setpoint)) = (pv, setpoint) else {
            tracing::warn!(
                entry = %self.config.entry_id,
                pv_available = pv.is_some(),
                setpoint_available = setpoint.is_some(),
                "process value or setpoint unavailable; holding output"
            );
            return self.idle_report(CycleStatus::Held);
        };

        let error = setpoint - pv;
        if std::mem::take(&mut self.resume_pending) {
            if let Some(last) = self.last_output {
                self.pid.bumpless_transfer(last, error, Some(pv));
            }
        }

        let step = self
            .pid
            .step(pv, error, self.last_output, self.config.options.rate_limit());
        self.last_output = Some(step.output);

        let mut report = self.distribute(states, step.output);
        report.step = Some(step);
        report
    }

    fn distribute(&mut self, states: &dyn StateStore, output: Real) -> CycleReport {
        let timer = Timer::start("distribute");
        let now = self.pid.clock().now();
        let entry_id = self.config.entry_id.as_str();
        let consumers = self.config.consumers.as_slice();

        // Read phase: everything below only borrows.
        let ctx = ConsumerContext::new(states, &self.runtime, &self.overrides);
        let tiers = self
            .manager
            .collect_enabled_priorities(consumers, &ctx, true);

        let mut inputs: Vec<ConsumerInput<'_>> = Vec::with_capacity(consumers.len());
        for consumer in consumers.iter().filter(|c| c.kind.is_recognized()) {
            let prev = ctx.runtime.snapshot(entry_id, &consumer.id);
            let threshold_w = self.manager.threshold_w(consumer, &ctx);
            let capacity_w = match consumer.kind {
                ConsumerKind::Controlled => consumer.max_power_value(),
                _ => threshold_w,
            };
            let commanded = prev.cmd_w;
            let finished_starting =
                self.manager
                    .is_consumer_finished_starting(consumer, &ctx, |power, max_power_w| {
                        let reference = max_power_w.min(commanded);
                        power > 0.0 && power >= reference * START_CONFIRM_FRACTION
                    });
            inputs.push(ConsumerInput {
                consumer,
                enabled: self.manager.is_enabled(consumer, &ctx),
                available: self.manager.is_available(consumer, &ctx),
                prev,
                capacity_w,
                step_w: self.manager.step_w(consumer, &ctx),
                deadband_pct: self.manager.pid_deadband_pct(consumer, &ctx),
                threshold_w,
                start_delay_s: self.manager.delay_seconds(consumer, true, &ctx),
                stop_delay_s: self.manager.delay_seconds(consumer, false, &ctx),
                finished_starting,
                finished_stopping: self.manager.is_consumer_finished_stopping(consumer, &ctx),
            });
        }

        let capacity_w: Real = inputs
            .iter()
            .filter(|i| i.eligible())
            .map(|i| i.capacity_w)
            .sum();
        let options = &self.config.options;
        let budget_w = capacity_w * output_fraction(output, options.min_output, options.max_output);

        let index_by_id: HashMap<&str, usize> = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| (input.consumer.id.as_str(), index))
            .collect();
        let mut grants: Vec<Real> = vec![0.0; inputs.len()];
        let mut remaining = budget_w;

        for &tier in &tiers {
            let members: Vec<usize> = self
                .manager
                .consumers_in_tier(consumers, &ctx, tier)
                .into_iter()
                .filter_map(|c| index_by_id.get(c.id.as_str()).copied())
                .filter(|&index| inputs[index].eligible())
                .collect();
            if members.is_empty() {
                continue;
            }

            let tier_capacity: Real = members.iter().map(|&i| inputs[i].capacity_w).sum();
            let share = remaining.min(tier_capacity) / members.len() as Real;
            for &index in &members {
                let input = &inputs[index];
                let grant = if input.consumer.is_controlled() {
                    round_down_to_step(share.min(input.capacity_w), input.step_w)
                } else if share >= input.threshold_w && input.threshold_w > 0.0 {
                    input.threshold_w
                } else {
                    0.0
                };
                grants[index] = grant.max(0.0);
                remaining -= grants[index];
            }
        }

        // Write phase.
        let mut commands = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            let consumer = input.consumer;
            let lifecycle = self.lifecycles.entry(consumer.id.clone()).or_default();
            lifecycle.observe(now, input.finished_starting, input.finished_stopping);

            if input.enabled && !input.available {
                self.manager.set_consumer_reason(
                    &mut self.runtime,
                    &consumer.id,
                    Some("power target unavailable"),
                );
                continue;
            }

            let (value, reason) = if !input.enabled {
                lifecycle.try_stop(now, 0.0);
                (off_value(consumer), "disabled")
            } else if consumer.is_controlled() {
                controlled_command(input, grants[index], lifecycle, now)
            } else {
                binary_command(input, grants[index], lifecycle, now)
            };

            let runtime = self.runtime.get_mut(entry_id, &consumer.id);
            let changed = record_command(runtime, value, input.threshold_w);
            runtime.is_active = lifecycle.phase().is_running();
            self.manager
                .set_consumer_reason(&mut self.runtime, &consumer.id, Some(reason));

            commands.push(ConsumerCommand {
                consumer_id: consumer.id.clone(),
                value,
                changed,
                reason: reason.to_string(),
            });
        }

        timer.stop_and_log(inputs.len());
        tracing::debug!(
            entry = entry_id,
            output,
            capacity_w,
            budget_w,
            tiers = tiers.len(),
            "surplus distributed"
        );

        CycleReport {
            status: CycleStatus::Stepped,
            step: None,
            output,
            capacity_w,
            budget_w,
            tiers,
            commands,
        }
    }
}

fn off_value(consumer: &Consumer) -> CommandValue {
    if consumer.is_controlled() {
        CommandValue::Power(0.0)
    } else {
        CommandValue::Switch(false)
    }
}

fn controlled_command(
    input: &ConsumerInput<'_>,
    grant_w: Real,
    lifecycle: &mut ConsumerLifecycle,
    now: Real,
) -> (CommandValue, &'static str) {
    let prev_w = input.prev.cmd_w;
    let max_w = input.capacity_w;
    let deadband_w = max_w * input.deadband_pct / 100.0;

    // Full-off and full-on always go through; small moves in between do not.
    let within_deadband =
        grant_w > 0.0 && grant_w < max_w && (grant_w - prev_w).abs() < deadband_w;
    let target_w = if within_deadband { prev_w } else { grant_w };

    match gate(
        lifecycle,
        now,
        target_w > 0.0,
        input.start_delay_s,
        input.stop_delay_s,
    ) {
        Gate::Run(_) if within_deadband => (CommandValue::Power(target_w), "within deadband"),
        Gate::Run(reason) => (CommandValue::Power(target_w), reason),
        Gate::Off(reason) => (CommandValue::Power(0.0), reason),
        Gate::Hold(reason) => (CommandValue::Power(prev_w), reason),
    }
}

fn binary_command(
    input: &ConsumerInput<'_>,
    grant_w: Real,
    lifecycle: &mut ConsumerLifecycle,
    now: Real,
) -> (CommandValue, &'static str) {
    match gate(
        lifecycle,
        now,
        grant_w > 0.0,
        input.start_delay_s,
        input.stop_delay_s,
    ) {
        Gate::Run(reason) => (CommandValue::Switch(true), reason),
        Gate::Off(reason) => (CommandValue::Switch(false), reason),
        Gate::Hold(reason) => (CommandValue::Switch(input.prev.is_on), reason),
    }
}

/// Store a command in the runtime record. Returns whether it changed.
fn record_command(runtime: &mut ConsumerRuntime, value: CommandValue, threshold_w: Real) -> bool {
    let prev_w = runtime.cmd_w;
    let prev_on = runtime.is_on;
    match value {
        CommandValue::Power(w) => {
            runtime.step_change_request = if w > prev_w {
                Some(StepRequest::Up)
            } else if w < prev_w {
                Some(StepRequest::Down)
            } else {
                None
            };
            runtime.cmd_w = w;
            runtime.is_on = w > 0.0;
        }
        CommandValue::Switch(on) => {
            runtime.step_change_request = None;
            runtime.cmd_w = if on { threshold_w } else { 0.0 };
            runtime.is_on = on;
        }
    }
    runtime.cmd_w != prev_w || runtime.is_on != prev_on
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_over_output_range() {
        assert_eq!(output_fraction(50.0, 0.0, 100.0), 0.5);
        assert_eq!(output_fraction(-10.0, 0.0, 100.0), 0.0);
        assert_eq!(output_fraction(150.0, 0.0, 100.0), 1.0);
        assert_eq!(output_fraction(20.0, 10.0, 30.0), 0.5);
        assert_eq!(output_fraction(5.0, 5.0, 5.0), 0.0);
    }

    #[test]
    fn rounding_to_step() {
        assert_eq!(round_down_to_step(1049.0, 100.0), 1000.0);
        assert_eq!(round_down_to_step(99.0, 100.0), 0.0);
        assert_eq!(round_down_to_step(420.0, 0.0), 420.0);
    }

    #[test]
    fn gate_honours_delays() {
        let mut lifecycle = ConsumerLifecycle::new();
        assert_eq!(gate(&mut lifecycle, 0.0, true, 60.0, 60.0), Gate::Run("starting"));
        assert_eq!(
            gate(&mut lifecycle, 1.0, true, 60.0, 60.0),
            Gate::Run("distributing surplus")
        );
        lifecycle.observe(2.0, true, false);
        assert_eq!(
            gate(&mut lifecycle, 30.0, false, 60.0, 60.0),
            Gate::Hold("minimum run time")
        );
        assert_eq!(gate(&mut lifecycle, 62.0, false, 60.0, 60.0), Gate::Off("stopping"));
        assert_eq!(gate(&mut lifecycle, 63.0, true, 60.0, 60.0), Gate::Off("stopping"));
        lifecycle.observe(64.0, false, true);
        assert_eq!(
            gate(&mut lifecycle, 70.0, true, 60.0, 60.0),
            Gate::Off("waiting for start delay")
        );
        assert_eq!(
            gate(&mut lifecycle, 70.0, false, 60.0, 60.0),
            Gate::Off("insufficient surplus")
        );
        assert_eq!(gate(&mut lifecycle, 125.0, true, 60.0, 60.0), Gate::Run("starting"));
    }

    #[test]
    fn recording_sets_step_requests() {
        let mut runtime = ConsumerRuntime::default();
        assert!(record_command(&mut runtime, CommandValue::Power(400.0), 0.0));
        assert_eq!(runtime.step_change_request, Some(StepRequest::Up));
        assert!(runtime.is_on);
        assert!(!record_command(&mut runtime, CommandValue::Power(400.0), 0.0));
        assert_eq!(runtime.step_change_request, None);
        assert!(record_command(&mut runtime, CommandValue::Power(100.0), 0.0));
        assert_eq!(runtime.step_change_request, Some(StepRequest::Down));

        let mut switch = ConsumerRuntime::default();
        assert!(record_command(&mut switch, CommandValue::Switch(true), 800.0));
        assert_eq!(switch.cmd_w, 800.0);
        assert!(!record_command(&mut switch, CommandValue::Switch(true), 800.0));
    }
}
