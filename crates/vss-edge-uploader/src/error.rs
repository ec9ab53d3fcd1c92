//! Upload transaction errors and their retry classification.

use thiserror::Error;

use vss_edge_core::retry::is_retryable_status;
use vss_edge_store::StoreError;

/// The four ordered HTTP steps of one upload transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    Presign,
    Put,
    Complete,
    Metadata,
}

impl std::fmt::Display for UploadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UploadStep::Presign => "presign",
            UploadStep::Put => "put",
            UploadStep::Complete => "complete",
            UploadStep::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

/// First failure in an upload transaction.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The clip file is gone. Terminal, no retries, no attempt counted.
    #[error("clip file not found: {path}")]
    MissingFile { path: String },

    /// The server answered with a non-success status.
    #[error("{step} failed with status {status}: {message}")]
    Server {
        step: UploadStep,
        status: u16,
        message: String,
    },

    /// Connect/read timeout, DNS failure, broken transfer.
    #[error("{step} transport error: {message}")]
    Transport { step: UploadStep, message: String },

    /// Structurally invalid presign response. Permanent.
    #[error("presign response missing '{field}'")]
    MalformedResponse { field: &'static str },

    /// The companion event vanished from the store. Permanent.
    #[error("event {event_id} not found in store")]
    EventNotFound { event_id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl UploadError {
    /// HTTP status for classification; 0 for transport and local failures.
    pub fn status_code(&self) -> u16 {
        match self {
            UploadError::Server { status, .. } => *status,
            _ => 0,
        }
    }

    /// Retry policy: transport failures and 5xx retry (up to the attempt
    /// cap); everything else is permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Transport { .. } => true,
            UploadError::Server { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}
