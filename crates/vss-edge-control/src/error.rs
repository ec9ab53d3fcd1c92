//! Control-plane client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("message bus error: {message}")]
    Bus { message: String },

    #[error("certificate material unreadable: {message}")]
    Certificates { message: String },

    #[error("ingest service rejected clip request (status {status}): {message}")]
    ClipRejected { status: u16, message: String },

    #[error("ingest service unreachable: {message}")]
    ClipDispatchFailed { message: String },

    #[error("malformed control message: {message}")]
    MalformedMessage { message: String },
}

impl From<rumqttc::ClientError> for ControlError {
    fn from(error: rumqttc::ClientError) -> Self {
        ControlError::Bus {
            message: error.to_string(),
        }
    }
}

impl From<ControlError> for vss_edge_core::EdgeError {
    fn from(error: ControlError) -> Self {
        match error {
            ControlError::Certificates { message } => {
                vss_edge_core::EdgeError::Config { message }
            }
            other => vss_edge_core::EdgeError::Fatal {
                message: other.to_string(),
            },
        }
    }
}
