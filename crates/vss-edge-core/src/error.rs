//! Error taxonomy shared by every edge-node service.
//!
//! Each variant maps to one recovery strategy:
//!
//! - [`EdgeError::Config`]: startup failure, process exits with code 1
//! - [`EdgeError::TransientNetwork`]: retried with backoff (uploader, sync)
//! - [`EdgeError::PermanentServer`]: terminal for the affected row, never
//!   blocks other rows
//! - [`EdgeError::Integrity`]: staged artifact discarded, retried on the
//!   next tick
//! - [`EdgeError::LocalIo`]: terminal for the affected row, surfaced via
//!   `/health`
//! - [`EdgeError::Database`]: store failure; fatal when it prevents startup
//! - [`EdgeError::Fatal`]: unrecoverable, process exits with code 2

use crate::config::ConfigError;

/// Primary error type for edge-node operations.
#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    /// Malformed or semantically invalid device configuration.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Connect/read timeout, 5xx response, DNS failure. Retryable.
    #[error("Transient network error: {message}")]
    TransientNetwork { message: String },

    /// 4xx response or a structurally invalid server response. Terminal for
    /// the affected row or package.
    #[error("Permanent server error (status {status}): {message}")]
    PermanentServer { status: u16, message: String },

    /// Checksum or signature verification failure on a downloaded artifact.
    #[error("Integrity error: {message}")]
    Integrity { message: String },

    /// Missing clip file, disk-full, unreadable artifact.
    #[error("Local I/O error: {message}")]
    LocalIo { message: String },

    /// Durable store operation failure.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Unrecoverable condition; the service manager should restart us.
    #[error("Fatal error: {message}")]
    Fatal { message: String },
}

/// Result type for edge-node operations.
pub type EdgeResult<T> = Result<T, EdgeError>;

impl EdgeError {
    /// Process exit code for errors that abort a service: configuration and
    /// startup failures exit 1, fatal runtime failures exit 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            EdgeError::Config { .. } => 1,
            _ => 2,
        }
    }

    /// Whether the uploader/sync retry policy applies to this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EdgeError::TransientNetwork { .. })
    }

    /// HTTP status classification used by the upload state machine: 0 for
    /// transport-level failures.
    pub fn status_code(&self) -> u16 {
        match self {
            EdgeError::PermanentServer { status, .. } => *status,
            _ => 0,
        }
    }
}

impl From<ConfigError> for EdgeError {
    fn from(error: ConfigError) -> Self {
        EdgeError::Config {
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for EdgeError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) if status.is_client_error() => EdgeError::PermanentServer {
                status: status.as_u16(),
                message: error.to_string(),
            },
            Some(status) if status.is_server_error() => EdgeError::TransientNetwork {
                message: format!("server returned {}: {}", status, error),
            },
            // Connect failures, timeouts, DNS errors.
            _ => EdgeError::TransientNetwork {
                message: error.to_string(),
            },
        }
    }
}

impl From<diesel::result::Error> for EdgeError {
    fn from(error: diesel::result::Error) -> Self {
        EdgeError::Database {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for EdgeError {
    fn from(error: serde_json::Error) -> Self {
        EdgeError::PermanentServer {
            status: 0,
            message: format!("malformed payload: {}", error),
        }
    }
}

impl From<std::io::Error> for EdgeError {
    fn from(error: std::io::Error) -> Self {
        EdgeError::LocalIo {
            message: error.to_string(),
        }
    }
}
