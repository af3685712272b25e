//! Classification of configuration updates.

use crate::config::EntryConfig;

/// How an updated entry must be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionsChange {
    /// Nothing the controller uses changed.
    Unchanged,
    /// Only tuning changed; applied live without losing controller state.
    Retune,
    /// Wiring, consumers or overrides changed; the entry is rebuilt.
    Rewire,
}

pub fn classify_change(old: &EntryConfig, new: &EntryConfig) -> OptionsChange {
    if old.wiring != new.wiring || old.consumers != new.consumers || old.overrides != new.overrides
    {
        OptionsChange::Rewire
    } else if old.options != new.options {
        OptionsChange::Retune
    } else {
        OptionsChange::Unchanged
    }
}
