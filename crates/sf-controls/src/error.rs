//! Error types for control system operations.

use sf_core::CoreError;
use thiserror::Error;

/// Result type for control system operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors reported when checking controller configuration.
///
/// The controller itself never fails a step; these only surface from
/// [`PidConfig::validate`](crate::PidConfig::validate).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// A gain or limit is NaN or infinite.
    #[error("Non-finite {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    /// Output limits are inverted.
    #[error("Invalid output limits: min_output {min} > max_output {max}")]
    InvertedLimits { min: f64, max: f64 },
}

impl From<CoreError> for ControlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NonFinite { what, value } => ControlError::NonFinite { what, value },
        }
    }
}
