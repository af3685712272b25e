//! Interpretation of physical device readbacks.

use sf_core::entity::{EntityState, EntityValue};
use sf_core::numeric::{Real, parse_finite};

/// State strings meaning the device is running.
pub const ON_TOKENS: [&str; 6] = ["on", "true", "home", "open", "1", "enabled"];
/// State strings meaning the device is stopped.
pub const OFF_TOKENS: [&str; 6] = ["off", "false", "not_home", "closed", "0", "disabled"];

/// Tri-state on/off reading of an entity.
///
/// Recognized tokens win (case-insensitive); otherwise a numeric value above
/// zero means on. Unavailable or unparseable states are unknown (`None`).
pub fn device_on(state: &EntityState) -> Option<bool> {
    if !state.is_available() {
        return None;
    }
    match &state.value {
        EntityValue::Bool(on) => Some(*on),
        EntityValue::Number(v) if v.is_finite() => Some(*v > 0.0),
        EntityValue::Number(_) => None,
        EntityValue::Text(text) => {
            let lowered = text.trim().to_lowercase();
            if ON_TOKENS.contains(&lowered.as_str()) {
                Some(true)
            } else if OFF_TOKENS.contains(&lowered.as_str()) {
                Some(false)
            } else {
                parse_finite(&lowered).map(|v| v > 0.0)
            }
        }
    }
}

/// Numeric power reading, `None` when unavailable or unparseable.
pub fn device_power(state: &EntityState) -> Option<Real> {
    state.number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_on_and_off_tokens() {
        for token in ON_TOKENS {
            assert_eq!(device_on(&EntityState::new(token)), Some(true), "{token}");
        }
        for token in OFF_TOKENS {
            assert_eq!(device_on(&EntityState::new(token)), Some(false), "{token}");
        }
        assert_eq!(device_on(&EntityState::new("ON")), Some(true));
        assert_eq!(device_on(&EntityState::new("Not_Home")), Some(false));
    }

    #[test]
    fn numeric_states_compare_against_zero() {
        assert_eq!(device_on(&EntityState::new("12.5")), Some(true));
        assert_eq!(device_on(&EntityState::new("-3")), Some(false));
        assert_eq!(device_on(&EntityState::new(0.0)), Some(false));
        assert_eq!(device_on(&EntityState::new(850.0)), Some(true));
    }

    #[test]
    fn boolean_states_map_directly() {
        assert_eq!(device_on(&EntityState::new(true)), Some(true));
        assert_eq!(device_on(&EntityState::new(false)), Some(false));
        let flagged = EntityState {
            value: EntityValue::Bool(true),
            available: false,
        };
        assert_eq!(device_on(&flagged), None);
    }

    #[test]
    fn unknown_states_are_none() {
        assert_eq!(device_on(&EntityState::new("heating")), None);
        assert_eq!(device_on(&EntityState::new("unavailable")), None);
        assert_eq!(device_on(&EntityState::new("unknown")), None);
        assert_eq!(device_on(&EntityState::unavailable()), None);
    }

    #[test]
    fn power_reads_numbers_only() {
        assert_eq!(device_power(&EntityState::new("1800")), Some(1800.0));
        assert_eq!(device_power(&EntityState::new("on")), None);
        assert_eq!(device_power(&EntityState::unavailable()), None);
    }
}
