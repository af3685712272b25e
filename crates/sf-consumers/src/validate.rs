//! Consumer configuration checks.
//!
//! Problems are collected into a [`ValidationReport`], never raised: the
//! caller decides whether an invalid configuration should block startup.

use std::collections::HashSet;

use sf_core::entity::StateStore;
use sf_core::numeric::Real;

use crate::consumer::{Consumer, ConsumerKind};

/// Configuration error in the consumer list.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConsumerIssue {
    #[error("Consumer at index {index} is missing id")]
    MissingId { index: usize },

    #[error("Duplicate consumer ID: {id}")]
    DuplicateId { id: String },

    #[error("Consumer {id} has invalid priority: {priority} (must be > 0)")]
    InvalidPriority { id: String, priority: Real },

    #[error("Consumer {id} has invalid type: {kind}")]
    InvalidType { id: String, kind: ConsumerKind },
}

/// Referenced entity that cannot currently be read. Never fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EntityWarning {
    #[error("Consumer {consumer_id}: Power target entity {entity_id} not found")]
    PowerTargetMissing {
        consumer_id: String,
        entity_id: String,
    },

    #[error("Consumer {consumer_id}: Power target entity {entity_id} is {state}")]
    PowerTargetUnavailable {
        consumer_id: String,
        entity_id: String,
        state: String,
    },

    #[error("Consumer {consumer_id}: State entity {entity_id} not found")]
    StateEntityMissing {
        consumer_id: String,
        entity_id: String,
    },
}

/// Collected findings of one check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport<T> {
    pub issues: Vec<T>,
}

impl<T: std::fmt::Display> ValidationReport<T> {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }

    /// `(is_valid, messages)` pair.
    pub fn into_parts(self) -> (bool, Vec<String>) {
        (self.is_valid(), self.messages())
    }
}

/// Missing ids, duplicate ids, non-positive priorities, unknown types.
///
/// A consumer without id or with a duplicate id is not checked further.
pub fn validate_consumers(consumers: &[Consumer]) -> ValidationReport<ConsumerIssue> {
    let mut issues = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for (index, consumer) in consumers.iter().enumerate() {
        if !consumer.has_id() {
            issues.push(ConsumerIssue::MissingId { index });
            continue;
        }
        if !seen.insert(consumer.id.as_str()) {
            issues.push(ConsumerIssue::DuplicateId {
                id: consumer.id.clone(),
            });
            continue;
        }

        let priority = consumer.priority_value();
        if !(priority > 0.0) {
            issues.push(ConsumerIssue::InvalidPriority {
                id: consumer.id.clone(),
                priority,
            });
        }

        if !consumer.kind.is_recognized() {
            issues.push(ConsumerIssue::InvalidType {
                id: consumer.id.clone(),
                kind: consumer.kind.clone(),
            });
        }
    }

    let report = ValidationReport { issues };
    if report.is_valid() {
        tracing::debug!(consumers = consumers.len(), "validated consumers successfully");
    } else {
        tracing::warn!(
            count = report.issues.len(),
            errors = ?report.messages(),
            "consumer validation found errors"
        );
    }
    report
}

/// Power target and state entities that are missing or unavailable.
pub fn validate_entity_accessibility(
    consumers: &[Consumer],
    states: &dyn StateStore,
) -> ValidationReport<EntityWarning> {
    let mut issues = Vec::new();

    for consumer in consumers.iter().filter(|c| c.has_id()) {
        if let Some(entity_id) = consumer.power_target_entity_id.as_deref() {
            match states.get(entity_id) {
                None => issues.push(EntityWarning::PowerTargetMissing {
                    consumer_id: consumer.id.clone(),
                    entity_id: entity_id.to_string(),
                }),
                Some(state) if !state.is_available() => {
                    issues.push(EntityWarning::PowerTargetUnavailable {
                        consumer_id: consumer.id.clone(),
                        entity_id: entity_id.to_string(),
                        state: state.label(),
                    })
                }
                Some(_) => {}
            }
        }

        if let Some(entity_id) = consumer.state_entity_id.as_deref() {
            if states.get(entity_id).is_none() {
                issues.push(EntityWarning::StateEntityMissing {
                    consumer_id: consumer.id.clone(),
                    entity_id: entity_id.to_string(),
                });
            }
        }
    }

    let report = ValidationReport { issues };
    if report.is_valid() {
        tracing::debug!(consumers = consumers.len(), "all consumer entities accessible");
    } else {
        let messages = report.messages();
        tracing::warn!(
            count = messages.len(),
            first = ?&messages[..messages.len().min(5)],
            "entity accessibility check found warnings"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_core::entity::MemoryStateStore;

    #[test]
    fn valid_list_passes() {
        let consumers = vec![
            Consumer::controlled("boiler", 1.0, 3000.0),
            Consumer::binary("pool", 2.0, 800.0),
        ];
        let (is_valid, errors) = validate_consumers(&consumers).into_parts();
        assert!(is_valid);
        assert!(errors.is_empty());
    }

    #[test]
    fn collects_every_problem() {
        let mut unnamed = Consumer::controlled("x", 1.0, 100.0);
        unnamed.id.clear();
        let mut weird = Consumer::controlled("weird", 2.0, 100.0);
        weird.kind = ConsumerKind::from("heat_pump".to_string());

        let consumers = vec![
            Consumer::controlled("boiler", 1.0, 3000.0),
            Consumer::controlled("boiler", 1.0, 3000.0),
            unnamed,
            Consumer::binary("pool", 0.0, 800.0),
            Consumer::binary("fan", -2.0, 50.0),
            weird,
        ];

        let report = validate_consumers(&consumers);
        assert!(!report.is_valid());
        assert_eq!(
            report.issues,
            vec![
                ConsumerIssue::DuplicateId {
                    id: "boiler".to_string()
                },
                ConsumerIssue::MissingId { index: 2 },
                ConsumerIssue::InvalidPriority {
                    id: "pool".to_string(),
                    priority: 0.0
                },
                ConsumerIssue::InvalidPriority {
                    id: "fan".to_string(),
                    priority: -2.0
                },
                ConsumerIssue::InvalidType {
                    id: "weird".to_string(),
                    kind: ConsumerKind::Unrecognized("heat_pump".to_string())
                },
            ]
        );

        let messages = report.messages();
        assert_eq!(messages[0], "Duplicate consumer ID: boiler");
        assert!(messages[2].contains("must be > 0"));
    }

    #[test]
    fn entity_warnings_never_fail_on_their_own() {
        let mut states = MemoryStateStore::new();
        states.set_unavailable("number.pool_power");

        let consumers = vec![
            Consumer::controlled("boiler", 1.0, 3000.0)
                .with_power_target("number.boiler_power")
                .with_state_entity("binary_sensor.boiler_running"),
            Consumer::binary("pool", 2.0, 800.0).with_power_target("number.pool_power"),
        ];

        assert!(validate_consumers(&consumers).is_valid());

        let report = validate_entity_accessibility(&consumers, &states);
        assert_eq!(report.issues.len(), 3);
        assert!(matches!(
            &report.issues[0],
            EntityWarning::PowerTargetMissing { consumer_id, .. } if consumer_id == "boiler"
        ));
        assert!(matches!(
            &report.issues[1],
            EntityWarning::StateEntityMissing { .. }
        ));
        assert_eq!(
            report.messages()[2],
            "Consumer pool: Power target entity number.pool_power is unavailable"
        );
    }
}
