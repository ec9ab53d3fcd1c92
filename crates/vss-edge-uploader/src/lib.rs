//! # VSS Edge Uploader
//!
//! Drains the pending-upload queue and runs the four-step upload
//! transaction against the central API: presign, PUT to object storage,
//! upload-complete, metadata. Owns the upload state machine; the
//! aggregator only exposes the queue.
//!
//! Delivery is at-least-once. Every server endpoint is idempotent keyed by
//! `event_id`/`upload_id`, so a transaction interrupted by a crash is safe
//! to repeat; abandoned `PROCESSING` rows are reclaimed at startup.

pub mod client;
pub mod error;
pub mod server;
pub mod worker;

pub use client::CentralApiClient;
pub use error::{UploadError, UploadStep};
pub use worker::Uploader;
