//! Consumer definitions as configured by the user.

use std::fmt;

use serde::{Deserialize, Serialize};
use sf_core::numeric::{Real, coerce_or};

pub const DEFAULT_PRIORITY: Real = 999.0;
pub const DEFAULT_START_DELAY_S: Real = 60.0;
pub const DEFAULT_STOP_DELAY_S: Real = 60.0;
pub const DEFAULT_STEP_W: Real = 100.0;
pub const DEFAULT_PID_DEADBAND_PCT: Real = 5.0;
pub const DEFAULT_THRESHOLD_W: Real = 500.0;

/// How a consumer accepts power.
///
/// Unknown kinds are kept verbatim instead of failing deserialization, so
/// that validation can report them alongside every other problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConsumerKind {
    /// Continuously adjustable power setpoint.
    Controlled,
    /// On/off load with a fixed draw.
    Binary,
    Unrecognized(String),
}

impl ConsumerKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Controlled => "controlled",
            Self::Binary => "binary",
            Self::Unrecognized(other) => other,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl Default for ConsumerKind {
    fn default() -> Self {
        Self::Unrecognized(String::new())
    }
}

impl From<String> for ConsumerKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "controlled" => Self::Controlled,
            "binary" => Self::Binary,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<ConsumerKind> for String {
    fn from(kind: ConsumerKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A controllable or binary load.
///
/// Numeric parameters are optional; effective values are resolved by the
/// [`ConsumerManager`](crate::ConsumerManager) from override entities, these
/// fields, and the crate defaults, in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Lower value means served first. Must be positive.
    #[serde(default)]
    pub priority: Option<Real>,
    #[serde(rename = "type", default)]
    pub kind: ConsumerKind,
    /// Where commands are written and actual power is read back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_target_entity_id: Option<String>,
    /// On/off feedback from the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_power_w: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_w: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_deadband_pct: Option<Real>,
    /// Surplus needed before a binary consumer is switched on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_w: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_delay_s: Option<Real>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_delay_s: Option<Real>,
}

impl Consumer {
    pub fn new(id: impl Into<String>, kind: ConsumerKind, priority: Real) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            priority: Some(priority),
            kind,
            power_target_entity_id: None,
            state_entity_id: None,
            max_power_w: None,
            step_w: None,
            pid_deadband_pct: None,
            threshold_w: None,
            start_delay_s: None,
            stop_delay_s: None,
        }
    }

    pub fn controlled(id: impl Into<String>, priority: Real, max_power_w: Real) -> Self {
        Self {
            max_power_w: Some(max_power_w),
            ..Self::new(id, ConsumerKind::Controlled, priority)
        }
    }

    pub fn binary(id: impl Into<String>, priority: Real, threshold_w: Real) -> Self {
        Self {
            threshold_w: Some(threshold_w),
            ..Self::new(id, ConsumerKind::Binary, priority)
        }
    }

    pub fn with_power_target(mut self, entity_id: impl Into<String>) -> Self {
        self.power_target_entity_id = Some(entity_id.into());
        self
    }

    pub fn with_state_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.state_entity_id = Some(entity_id.into());
        self
    }

    /// Configured priority, [`DEFAULT_PRIORITY`] when absent.
    pub fn priority_value(&self) -> Real {
        coerce_or(self.priority, DEFAULT_PRIORITY)
    }

    /// Configured maximum power, zero when absent.
    pub fn max_power_value(&self) -> Real {
        coerce_or(self.max_power_w, 0.0)
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn is_controlled(&self) -> bool {
        self.kind == ConsumerKind::Controlled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        assert_eq!(ConsumerKind::from("controlled".to_string()), ConsumerKind::Controlled);
        assert_eq!(ConsumerKind::from("binary".to_string()), ConsumerKind::Binary);
        let other = ConsumerKind::from("dimmer".to_string());
        assert!(!other.is_recognized());
        assert_eq!(other.to_string(), "dimmer");
    }

    #[test]
    fn deserializes_with_defaults() {
        let yaml = r#"
id: boiler
name: Hot water
priority: 1
type: controlled
power_target_entity_id: number.boiler_power
max_power_w: 3000
"#;
        let consumer: Consumer = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(consumer.id, "boiler");
        assert!(consumer.is_controlled());
        assert_eq!(consumer.priority_value(), 1.0);
        assert_eq!(consumer.max_power_value(), 3000.0);
        assert!(consumer.step_w.is_none());
        assert!(consumer.state_entity_id.is_none());
    }

    #[test]
    fn unknown_type_and_missing_fields_survive_parsing() {
        let yaml = "name: Mystery\ntype: heat_pump\n";
        let consumer: Consumer = serde_yaml::from_str(yaml).unwrap();
        assert!(!consumer.has_id());
        assert_eq!(consumer.kind, ConsumerKind::Unrecognized("heat_pump".to_string()));
        assert_eq!(consumer.priority_value(), DEFAULT_PRIORITY);
    }

    #[test]
    fn missing_type_is_unrecognized() {
        let consumer: Consumer = serde_yaml::from_str("id: a\n").unwrap();
        assert!(!consumer.kind.is_recognized());
    }
}
