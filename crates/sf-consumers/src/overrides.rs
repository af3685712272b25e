//! Live numeric overrides for consumer parameters.
//!
//! The host exposes adjustable number entities per consumer (start delay,
//! step size, ...). They are registered under a unique id built from the
//! entry, the consumer and the parameter suffix; the resolver maps that back
//! to the entity id whose state holds the current value.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Integration domain used as the unique id prefix.
pub const DOMAIN: &str = "solar_energy_flow";

/// Consumer parameters that can be overridden at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OverrideParam {
    #[serde(rename = "start_delay_s")]
    StartDelay,
    #[serde(rename = "stop_delay_s")]
    StopDelay,
    #[serde(rename = "step_w")]
    Step,
    #[serde(rename = "pid_deadband_pct")]
    DeadbandPct,
    #[serde(rename = "threshold_w")]
    Threshold,
}

impl OverrideParam {
    pub const ALL: [OverrideParam; 5] = [
        Self::StartDelay,
        Self::StopDelay,
        Self::Step,
        Self::DeadbandPct,
        Self::Threshold,
    ];

    /// Suffix of the override entity's unique id.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::StartDelay => "start_delay_s",
            Self::StopDelay => "stop_delay_s",
            Self::Step => "step_w",
            Self::DeadbandPct => "pid_deadband_pct",
            Self::Threshold => "threshold_w",
        }
    }
}

impl fmt::Display for OverrideParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Finds the entity holding a consumer parameter override.
pub trait OverrideResolver {
    fn lookup(&self, consumer_id: &str, param: OverrideParam) -> Option<String>;
}

/// Resolver with no override entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverrides;

impl OverrideResolver for NoOverrides {
    fn lookup(&self, _consumer_id: &str, _param: OverrideParam) -> Option<String> {
        None
    }
}

pub fn unique_id(entry_id: &str, consumer_id: &str, param: OverrideParam) -> String {
    format!("{DOMAIN}_{entry_id}_{consumer_id}_{}", param.suffix())
}

/// Unique-id keyed registry of override entities for one entry.
#[derive(Debug, Clone, Default)]
pub struct RegistryOverrides {
    entry_id: String,
    by_unique_id: HashMap<String, String>,
}

impl RegistryOverrides {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            by_unique_id: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        consumer_id: &str,
        param: OverrideParam,
        entity_id: impl Into<String>,
    ) {
        self.by_unique_id.insert(
            unique_id(&self.entry_id, consumer_id, param),
            entity_id.into(),
        );
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn len(&self) -> usize {
        self.by_unique_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_unique_id.is_empty()
    }
}

impl OverrideResolver for RegistryOverrides {
    fn lookup(&self, consumer_id: &str, param: OverrideParam) -> Option<String> {
        self.by_unique_id
            .get(&unique_id(&self.entry_id, consumer_id, param))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_id_format() {
        assert_eq!(
            unique_id("abc", "boiler", OverrideParam::Step),
            "solar_energy_flow_abc_boiler_step_w"
        );
    }

    #[test]
    fn registry_resolves_registered_params_only() {
        let mut registry = RegistryOverrides::new("abc");
        registry.register("boiler", OverrideParam::StartDelay, "number.boiler_start_delay");

        assert_eq!(
            registry.lookup("boiler", OverrideParam::StartDelay).as_deref(),
            Some("number.boiler_start_delay")
        );
        assert!(registry.lookup("boiler", OverrideParam::StopDelay).is_none());
        assert!(registry.lookup("pool", OverrideParam::StartDelay).is_none());
        assert!(NoOverrides.lookup("boiler", OverrideParam::StartDelay).is_none());
    }
}
