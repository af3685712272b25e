//! Application service layer for solarflow.
//!
//! Ties the PID controller and the consumer bookkeeping together into a
//! controller entry, and provides the entry schema, option change handling
//! and offline simulation shared by the front ends.

pub mod config;
pub mod entry;
pub mod error;
pub mod options;
pub mod simulate;

pub use config::{
    ControllerOptions, EntryConfig, OverrideMap, Scenario, Wiring, load_entry, parse_entry,
};
pub use entry::{
    CommandValue, ConsumerCommand, ControllerEntry, CycleReport, CycleStatus,
    START_CONFIRM_FRACTION,
};
pub use error::{AppError, AppResult};
pub use options::{OptionsChange, classify_change};
pub use simulate::{CycleRecord, SimulationOptions, apply_commands, consumed_w, run_scenario};
