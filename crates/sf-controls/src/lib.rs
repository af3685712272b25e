//! Feedback control primitives for solarflow.
//!
//! The control loop is driven by an external scheduler: every cycle it reads
//! the process value, computes the error with its own sign and deadband
//! conventions, and calls [`PidController::step`]. The controller keeps the
//! integral and previous-sample history between calls and measures elapsed
//! time with an injected [`Clock`].
//!
//! # Architecture
//!
//! - Configuration ([`PidConfig`]) is an immutable tuning snapshot
//! - State ([`PidState`]) is owned by exactly one controller instance
//! - Each step returns a fresh [`PidStepResult`] that is not retained
//!
//! Calls for one controller must be strictly sequential; there is no internal
//! locking.

pub mod clock;
pub mod error;
pub mod pid;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{ControlError, ControlResult};
pub use pid::{PidConfig, PidController, PidState, PidStepResult, RateLimit};
