//! Configuration error types.

use thiserror::Error;

/// Errors surfaced while loading or validating the device configuration.
/// All of them are startup failures: the process exits non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {message}")]
    ReadFailed { path: String, message: String },

    #[error("Error parsing YAML configuration: {0}")]
    ParseError(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Duplicate camera id found: {camera_id}")]
    DuplicateCameraId { camera_id: String },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
