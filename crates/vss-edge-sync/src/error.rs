//! Sync worker errors.

use thiserror::Error;

use vss_edge_core::retry::is_retryable_status;
use vss_edge_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync endpoint returned status {status}: {message}")]
    Server { status: u16, message: String },

    #[error("sync transport error: {message}")]
    Transport { message: String },

    #[error("package manifest is malformed: {message}")]
    MalformedManifest { message: String },

    /// SHA-256 mismatch on a downloaded artifact.
    #[error("checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    /// Signature verification failure against the provisioned public key.
    #[error("signature verification failed for {artifact}: {message}")]
    SignatureInvalid { artifact: String, message: String },

    #[error("invalid signing key material: {message}")]
    InvalidKey { message: String },

    /// The CV engine rejected or never answered the reload call.
    #[error("model reload failed: {message}")]
    ReloadFailed { message: String },

    #[error("archive extraction failed: {message}")]
    ExtractionFailed { message: String },

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Whether the next tick may simply try again: transport failures and
    /// 5xx responses. Integrity and signature failures also clear up on a
    /// republished artifact, but they are logged loudly, not as routine
    /// retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { .. } => true,
            SyncError::Server { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => SyncError::Server {
                status: status.as_u16(),
                message: error.to_string(),
            },
            None => SyncError::Transport {
                message: error.to_string(),
            },
        }
    }
}
