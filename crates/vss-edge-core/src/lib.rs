//! # VSS Edge Core
//!
//! Shared foundation for the VSS edge-node agent services:
//!
//! - Typed device configuration loaded from YAML with semantic validation
//! - The [`EdgeError`] taxonomy shared by every service
//! - The exponential-backoff helper and retry classification shared by
//!   uploader, sync and ingest
//! - The tagged event document exchanged between producers and the pipeline
//! - RTSP URL resolution from NVR configuration
//! - File checksum, disk usage and logging utilities
//!
//! Every service builds its context (config + store handles) once at its
//! entry point and threads it into component constructors; nothing in this
//! crate holds process-global state.

pub mod config;
pub mod checksum;
pub mod disk;
pub mod error;
pub mod events;
pub mod retry;
pub mod rtsp;
pub mod telemetry;

pub use config::EdgeConfig;
pub use error::{EdgeError, EdgeResult};
pub use events::{EventDocument, EventSubmission};
