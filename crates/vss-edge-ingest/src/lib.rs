//! # VSS Edge Ingest
//!
//! Owns one long-running ffmpeg segmenter per configured camera:
//!
//! - children run as process-group leaders; shutdown signals the group
//!   (SIGTERM, then SIGKILL after a grace period)
//! - an exited child restarts with exponential backoff
//! - a disk-budget task pauses new segmenter starts and evicts the oldest
//!   complete segments when the clip volume runs hot; a running segmenter
//!   is never killed for budget reasons
//! - on-demand clip extraction stitches overlapping segments and re-enters
//!   the delivery pipeline through the aggregator

pub mod clips;
pub mod disk;
pub mod error;
pub mod events;
pub mod segmenter;
pub mod server;
pub mod supervisor;

pub use error::IngestError;
pub use supervisor::IngestSupervisor;
