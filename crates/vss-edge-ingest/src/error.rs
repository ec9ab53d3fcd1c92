//! Ingest errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no recorded segments overlap [{from}, {to}] for camera {camera_id}")]
    NoSegments {
        camera_id: String,
        from: String,
        to: String,
    },

    #[error("ffmpeg exited with {status}: {stderr}")]
    FfmpegFailed { status: String, stderr: String },

    #[error("failed to spawn ffmpeg: {message}")]
    SpawnFailed { message: String },

    #[error("aggregator rejected the event (status {status}): {message}")]
    AggregatorRejected { status: u16, message: String },

    #[error("aggregator unreachable: {message}")]
    AggregatorUnreachable { message: String },

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),
}
