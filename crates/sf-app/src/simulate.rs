//! Offline closed-loop runs against an in-memory state store.
//!
//! Devices are ideal: every command is echoed into the store as the
//! consumer's power and on/off state before the next cycle. The grid reading
//! for each cycle is `consumed - surplus`, so exported power is negative.

use serde::{Deserialize, Serialize};
use sf_controls::ManualClock;
use sf_core::{MemoryStateStore, StateStore};
use sf_core::numeric::Real;

use crate::config::EntryConfig;
use crate::entry::{CommandValue, ControllerEntry, CycleReport};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationOptions {
    pub cycles: usize,
    /// Seconds between cycles.
    pub dt_s: Real,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle: usize,
    pub time_s: Real,
    /// Surplus from the trace, `None` when the seeded process value is used.
    pub surplus_w: Option<Real>,
    /// Power drawn by consumers going into the cycle (W).
    pub consumed_w: Real,
    pub report: CycleReport,
}

/// Power the entry's consumers currently draw according to their runtime.
pub fn consumed_w(entry: &ControllerEntry<ManualClock>) -> Real {
    entry
        .config()
        .consumers
        .iter()
        .map(|c| entry.consumer_runtime(&c.id))
        .filter(|runtime| runtime.is_on)
        .map(|runtime| runtime.cmd_w)
        .sum()
}

/// Echo a cycle's commands into the store.
pub fn apply_commands(
    entry: &ControllerEntry<ManualClock>,
    states: &mut MemoryStateStore,
    report: &CycleReport,
) {
    let config = entry.config();
    states.set_number(config.wiring.output_entity_id.clone(), report.output);

    for command in &report.commands {
        let Some(consumer) = config.consumers.iter().find(|c| c.id == command.consumer_id) else {
            continue;
        };
        let power_w = match command.value {
            CommandValue::Power(w) => w,
            CommandValue::Switch(_) => entry.consumer_runtime(&consumer.id).cmd_w,
        };
        if let Some(entity_id) = &consumer.power_target_entity_id {
            states.set_number(entity_id.clone(), power_w);
        }
        if let Some(entity_id) = &consumer.state_entity_id {
            let state = if command.value.is_on() { "on" } else { "off" };
            states.set_text(entity_id.clone(), state);
        }
    }
}

/// Run `options.cycles` cycles of the entry's scenario.
///
/// The surplus trace repeats when shorter than the run. The setpoint entity
/// is seeded to 0 W when the file does not provide it.
pub fn run_scenario(
    config: EntryConfig,
    options: SimulationOptions,
) -> AppResult<Vec<CycleRecord>> {
    if !(options.dt_s.is_finite() && options.dt_s > 0.0) {
        return Err(AppError::InvalidInput(format!(
            "cycle interval must be positive, got {}",
            options.dt_s
        )));
    }

    let mut states = config.states.clone();
    let setpoint_id = config.wiring.setpoint_entity_id.clone();
    if states.get(&setpoint_id).is_none() {
        states.set_number(setpoint_id, 0.0);
    }
    let process_value_id = config.wiring.process_value_entity_id.clone();
    let trace = config.scenario.surplus_w.clone();

    let mut entry = ControllerEntry::with_clock(config, ManualClock::new(0.0))?;
    let mut records = Vec::with_capacity(options.cycles);

    for cycle in 0..options.cycles {
        if cycle > 0 {
            entry.clock_mut().advance(options.dt_s);
        }
        let consumed = consumed_w(&entry);
        let surplus = (!trace.is_empty()).then(|| trace[cycle % trace.len()]);
        if let Some(surplus) = surplus {
            states.set_number(process_value_id.clone(), consumed - surplus);
        }

        let report = entry.cycle(&states);
        apply_commands(&entry, &mut states, &report);
        records.push(CycleRecord {
            cycle,
            time_s: cycle as Real * options.dt_s,
            surplus_w: surplus,
            consumed_w: consumed,
            report,
        });
    }

    tracing::debug!(cycles = records.len(), "scenario finished");
    Ok(records)
}
