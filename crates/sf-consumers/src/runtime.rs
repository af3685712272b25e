//! Mutable per-consumer runtime records.
//!
//! Runtimes are scoped to the configuration entry that owns the consumer and
//! are created lazily on first write. Readers that find no record see the
//! defaults (enabled, nothing commanded).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sf_core::numeric::Real;

/// Pending request to move a controlled consumer by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRequest {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerRuntime {
    /// Internal soft-disable; independent of the physical device state.
    pub enabled: bool,
    pub is_active: bool,
    pub step_change_request: Option<StepRequest>,
    /// Last commanded power (W).
    pub cmd_w: Real,
    /// Last commanded binary state.
    pub is_on: bool,
    /// Human-readable status.
    pub reason: String,
}

impl Default for ConsumerRuntime {
    fn default() -> Self {
        Self {
            enabled: true,
            is_active: false,
            step_change_request: None,
            cmd_w: 0.0,
            is_on: false,
            reason: String::new(),
        }
    }
}

/// Runtime records keyed by `(entry_id, consumer_id)`.
///
/// Owned by the control-loop instance; dropping an entry's records is part of
/// tearing that entry down.
#[derive(Debug, Clone, Default)]
pub struct RuntimeStore {
    entries: HashMap<String, HashMap<String, ConsumerRuntime>>,
}

impl RuntimeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, entry_id: &str, consumer_id: &str) -> Option<&ConsumerRuntime> {
        self.entries.get(entry_id)?.get(consumer_id)
    }

    /// Copy of the record, or defaults when none exists yet.
    pub fn snapshot(&self, entry_id: &str, consumer_id: &str) -> ConsumerRuntime {
        self.get(entry_id, consumer_id).cloned().unwrap_or_default()
    }

    /// Record for writing, created with defaults on first access.
    pub fn get_mut(&mut self, entry_id: &str, consumer_id: &str) -> &mut ConsumerRuntime {
        self.entries
            .entry(entry_id.to_string())
            .or_default()
            .entry(consumer_id.to_string())
            .or_default()
    }

    pub fn set_enabled(&mut self, entry_id: &str, consumer_id: &str, enabled: bool) {
        self.get_mut(entry_id, consumer_id).enabled = enabled;
    }

    /// Drop every record of an entry. Returns how many were removed.
    pub fn remove_entry(&mut self, entry_id: &str) -> usize {
        self.entries.remove(entry_id).map_or(0, |records| records.len())
    }

    pub fn entry_len(&self, entry_id: &str) -> usize {
        self.entries.get(entry_id).map_or(0, HashMap::len)
    }
}
