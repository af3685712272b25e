//! sf-core: shared foundation for solarflow.
//!
//! Contains:
//! - numeric (Real, finiteness checks and tolerant parsing)
//! - entity (entity states and the state store abstraction)
//! - timing (cheap elapsed-time measurement for debug logging)
//! - error (shared error types)

pub mod entity;
pub mod error;
pub mod numeric;
pub mod timing;

// Re-exports: nice ergonomics for downstream crates
pub use entity::{EntityState, EntityValue, MemoryStateStore, StateStore};
pub use error::{CoreError, CoreResult};
pub use numeric::*;
pub use timing::Timer;
