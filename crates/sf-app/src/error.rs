//! Error types for the sf-app service layer.

use std::path::PathBuf;

/// Application error type shared by every front end.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to read entry file: {path}")]
    EntryFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse entry YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid consumer configuration: {}", .0.join("; "))]
    InvalidConsumers(Vec<String>),

    #[error("Entry id mismatch: expected {expected}, got {found}")]
    EntryMismatch { expected: String, found: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid controller tuning: {0}")]
    InvalidTuning(#[source] sf_controls::ControlError),
}

/// Result type for sf-app operations.
pub type AppResult<T> = Result<T, AppError>;
