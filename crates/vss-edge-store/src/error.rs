//! Store error types.

use thiserror::Error;

use vss_edge_core::EdgeError;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create database connection pool: {0}")]
    PoolCreation(String),

    #[error("Failed to get database connection: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("Duplicate event id: {event_id}")]
    DuplicateEvent { event_id: String },

    #[error("Upload {upload_id} not found")]
    UploadNotFound { upload_id: String },

    #[error("Upload {upload_id} cannot move from {from} to {to}")]
    InvalidTransition {
        upload_id: String,
        from: String,
        to: String,
    },

    #[error("Stored event document is corrupt: {0}")]
    CorruptDocument(String),

    #[error("Database I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for EdgeError {
    fn from(error: StoreError) -> Self {
        EdgeError::Database {
            message: error.to_string(),
        }
    }
}
