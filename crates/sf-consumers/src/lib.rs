//! Consumer bookkeeping for surplus distribution.
//!
//! A consumer is an electrical load the controller may hand surplus power to.
//! This crate does not decide how much power each consumer gets; it answers
//! the questions the allocation loop asks every cycle:
//!
//! - is the consumer enabled, available, valid?
//! - what are its effective parameters (with live overrides)?
//! - what does the physical device report, and has a start/stop completed?
//! - which priority tiers exist among enabled consumers?
//!
//! Consumer definitions are owned by the caller and passed in each call. The
//! [`ConsumerManager`] only owns derived caches, which are keyed by content
//! signatures of the consumer list.

pub mod consumer;
pub mod feedback;
pub mod lifecycle;
pub mod manager;
pub mod overrides;
pub mod priority;
pub mod runtime;
pub mod validate;

pub use consumer::{Consumer, ConsumerKind};
pub use lifecycle::{ConsumerLifecycle, ConsumerPhase};
pub use manager::{ConsumerContext, ConsumerManager};
pub use overrides::{NoOverrides, OverrideParam, OverrideResolver, RegistryOverrides};
pub use priority::PRIORITY_TOLERANCE;
pub use runtime::{ConsumerRuntime, RuntimeStore, StepRequest};
pub use validate::{ConsumerIssue, EntityWarning, ValidationReport};
