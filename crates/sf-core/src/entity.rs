//! Named quantities ("entities") and the store they are read from.
//!
//! Every control input and consumer feedback signal enters the system as an
//! entity: a string or numeric value plus an availability flag. The host is
//! responsible for keeping the store current; the control code only reads it
//! (and the simulation front end writes device echoes into a [`MemoryStateStore`]).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::numeric::{Real, parse_finite};

/// State strings the host uses for entities that exist but carry no value.
pub const UNAVAILABLE: &str = "unavailable";
pub const UNKNOWN: &str = "unknown";

/// Raw entity value as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Bool(bool),
    Number(Real),
    Text(String),
}

impl EntityValue {
    /// Numeric view of the value; text is parsed tolerantly. Booleans have
    /// no numeric reading.
    pub fn as_number(&self) -> Option<Real> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::Number(_) | Self::Bool(_) => None,
            Self::Text(text) => parse_finite(text),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) | Self::Bool(_) => None,
        }
    }
}

impl From<Real> for EntityValue {
    fn from(v: Real) -> Self {
        Self::Number(v)
    }
}

impl From<bool> for EntityValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for EntityValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Snapshot of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EntityStateDef")]
pub struct EntityState {
    pub value: EntityValue,
    pub available: bool,
}

impl EntityState {
    pub fn new(value: impl Into<EntityValue>) -> Self {
        Self {
            value: value.into(),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            value: EntityValue::Text(UNAVAILABLE.to_string()),
            available: false,
        }
    }

    /// False when flagged unavailable or when the value is one of the host's
    /// placeholder strings (`unavailable`, `unknown`).
    pub fn is_available(&self) -> bool {
        if !self.available {
            return false;
        }
        !matches!(self.value.as_text(), Some(UNAVAILABLE | UNKNOWN))
    }

    /// Numeric reading, `None` when unavailable or unparseable.
    pub fn number(&self) -> Option<Real> {
        if self.is_available() {
            self.value.as_number()
        } else {
            None
        }
    }

    /// Host-style state label (`"unavailable"` for flagged entities).
    pub fn label(&self) -> String {
        if !self.available {
            return UNAVAILABLE.to_string();
        }
        match &self.value {
            EntityValue::Text(text) => text.clone(),
            EntityValue::Number(v) => v.to_string(),
            EntityValue::Bool(true) => "on".to_string(),
            EntityValue::Bool(false) => "off".to_string(),
        }
    }
}

/// Either the full `{ value, available }` form or a bare scalar.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityStateDef {
    Full {
        value: EntityValue,
        #[serde(default = "default_available")]
        available: bool,
    },
    Bare(EntityValue),
}

fn default_available() -> bool {
    true
}

impl From<EntityStateDef> for EntityState {
    fn from(def: EntityStateDef) -> Self {
        match def {
            EntityStateDef::Full { value, available } => Self { value, available },
            EntityStateDef::Bare(value) => Self::new(value),
        }
    }
}

/// Read access to the host's entity states.
///
/// Implemented by whatever owns the live data (the host adapter, or the
/// in-memory store used for simulation and tests).
pub trait StateStore {
    /// Current state of an entity, `None` if the entity does not exist.
    fn get(&self, entity_id: &str) -> Option<EntityState>;

    /// Numeric value of an available entity.
    fn number(&self, entity_id: &str) -> Option<Real> {
        self.get(entity_id).and_then(|state| state.number())
    }

    /// True when the entity exists and is available.
    fn is_available(&self, entity_id: &str) -> bool {
        self.get(entity_id).is_some_and(|state| state.is_available())
    }
}

/// Hash map backed store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStateStore {
    states: HashMap<String, EntityState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, entity_id: impl Into<String>, state: EntityState) {
        self.states.insert(entity_id.into(), state);
    }

    pub fn set_number(&mut self, entity_id: impl Into<String>, value: Real) {
        self.set(entity_id, EntityState::new(value));
    }

    pub fn set_text(&mut self, entity_id: impl Into<String>, value: impl Into<String>) {
        self.set(entity_id, EntityState::new(value.into()));
    }

    pub fn set_unavailable(&mut self, entity_id: impl Into<String>) {
        self.set(entity_id, EntityState::unavailable());
    }

    pub fn remove(&mut self, entity_id: &str) -> Option<EntityState> {
        self.states.remove(entity_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).cloned()
    }
}

impl<S: StateStore + ?Sized> StateStore for &S {
    fn get(&self, entity_id: &str) -> Option<EntityState> {
        (**self).get(entity_id)
    }
}
