//! Entry configuration schema and YAML loading.
//!
//! One YAML file describes one controller entry: the entities it is wired
//! to, the tuning options, the consumers it distributes surplus to, the
//! override entities registered for them, and (for offline runs) a seeded
//! state snapshot plus a surplus trace.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sf_consumers::{Consumer, OverrideParam, RegistryOverrides};
use sf_controls::{PidConfig, RateLimit};
use sf_core::MemoryStateStore;
use sf_core::numeric::Real;

use crate::error::{AppError, AppResult};

/// Entities the controller reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wiring {
    /// Measured grid power (W, import positive).
    pub process_value_entity_id: String,
    /// Target grid power (W).
    pub setpoint_entity_id: String,
    /// Where the controller output (%) is published.
    pub output_entity_id: String,
}

/// Runtime tuning. Changing only these fields never rewires the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerOptions {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_kp")]
    pub kp: Real,
    #[serde(default = "default_ki")]
    pub ki: Real,
    #[serde(default)]
    pub kd: Real,
    #[serde(default)]
    pub min_output: Real,
    #[serde(default = "default_max_output")]
    pub max_output: Real,
    #[serde(default = "default_update_interval_s")]
    pub update_interval_s: Real,
    #[serde(default)]
    pub rate_limiter_enabled: bool,
    /// Output units per second.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Real,
}

fn default_enabled() -> bool {
    true
}

fn default_kp() -> Real {
    1.0
}

fn default_ki() -> Real {
    0.05
}

fn default_max_output() -> Real {
    100.0
}

fn default_update_interval_s() -> Real {
    10.0
}

fn default_rate_limit() -> Real {
    10.0
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            kp: default_kp(),
            ki: default_ki(),
            kd: 0.0,
            min_output: 0.0,
            max_output: default_max_output(),
            update_interval_s: default_update_interval_s(),
            rate_limiter_enabled: false,
            rate_limit: default_rate_limit(),
        }
    }
}

impl ControllerOptions {
    pub fn pid_config(&self) -> PidConfig {
        PidConfig::new(self.kp, self.ki, self.kd, self.min_output, self.max_output)
    }

    pub fn rate_limit(&self) -> RateLimit {
        RateLimit {
            enabled: self.rate_limiter_enabled,
            per_second: self.rate_limit,
        }
    }
}

/// Override entity ids per consumer and parameter.
pub type OverrideMap = BTreeMap<String, BTreeMap<OverrideParam, String>>;

/// Offline inputs for `sf-cli run`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Solar surplus before any consumer draws power, one value per cycle (W).
    #[serde(default)]
    pub surplus_w: Vec<Real>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub entry_id: String,
    #[serde(default)]
    pub title: String,
    pub wiring: Wiring,
    #[serde(default)]
    pub options: ControllerOptions,
    #[serde(default)]
    pub consumers: Vec<Consumer>,
    #[serde(default)]
    pub overrides: OverrideMap,
    /// Initial entity states.
    #[serde(default)]
    pub states: MemoryStateStore,
    #[serde(default)]
    pub scenario: Scenario,
}

impl EntryConfig {
    /// Registry resolving this entry's override entities.
    pub fn override_registry(&self) -> RegistryOverrides {
        let mut registry = RegistryOverrides::new(self.entry_id.clone());
        for (consumer_id, params) in &self.overrides {
            for (param, entity_id) in params {
                registry.register(consumer_id, *param, entity_id.clone());
            }
        }
        registry
    }
}

/// Parse an entry from YAML text.
pub fn parse_entry(content: &str) -> AppResult<EntryConfig> {
    let entry: EntryConfig = serde_yaml::from_str(content)?;
    if entry.entry_id.trim().is_empty() {
        return Err(AppError::InvalidInput("entry_id must not be empty".to_string()));
    }
    Ok(entry)
}

/// Load an entry from a YAML file.
pub fn load_entry(path: &Path) -> AppResult<EntryConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AppError::EntryFileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let entry = parse_entry(&content)?;
    tracing::debug!(
        entry = %entry.entry_id,
        consumers = entry.consumers.len(),
        path = %path.display(),
        "loaded entry"
    );
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_consumers::OverrideResolver;
    use sf_core::StateStore;

    const MINIMAL: &str = r#"
entry_id: garage
wiring:
  process_value_entity_id: sensor.grid_power
  setpoint_entity_id: input_number.grid_target
  output_entity_id: number.surplus_output
"#;

    #[test]
    fn minimal_entry_uses_defaults() {
        let entry = parse_entry(MINIMAL).unwrap();
        assert_eq!(entry.options, ControllerOptions::default());
        assert!(entry.consumers.is_empty());
        assert!(entry.states.is_empty());

        let options = &entry.options;
        assert!(options.enabled);
        assert_eq!(options.kp, 1.0);
        assert_eq!(options.ki, 0.05);
        assert_eq!(options.max_output, 100.0);
        assert_eq!(options.update_interval_s, 10.0);
        assert!(!options.rate_limit().is_active());
    }

    #[test]
    fn overrides_and_states_are_parsed() {
        let yaml = format!(
            "{MINIMAL}{}",
            r#"
options:
  kp: 0.4
  rate_limiter_enabled: true
  rate_limit: 5
overrides:
  boiler:
    step_w: number.boiler_step
states:
  sensor.grid_power: -350
  number.boiler_step: "200"
  switch.boiler: { value: "off", available: false }
"#
        );
        let entry = parse_entry(&yaml).unwrap();
        assert_eq!(entry.options.kp, 0.4);
        assert_eq!(entry.options.ki, 0.05);
        assert!(entry.options.rate_limit().is_active());

        let registry = entry.override_registry();
        assert_eq!(
            registry.lookup("boiler", OverrideParam::Step).as_deref(),
            Some("number.boiler_step")
        );
        assert_eq!(entry.states.number("sensor.grid_power"), Some(-350.0));
        assert_eq!(entry.states.number("number.boiler_step"), Some(200.0));
        assert!(!entry.states.is_available("switch.boiler"));
    }

    #[test]
    fn empty_entry_id_is_rejected() {
        let yaml = MINIMAL.replace("garage", "\"\"");
        assert!(matches!(parse_entry(&yaml), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn missing_wiring_is_a_parse_error() {
        assert!(matches!(parse_entry("entry_id: x\n"), Err(AppError::Parse(_))));
    }
}
