//! # VSS Edge Store
//!
//! The single durable store shared by the edge-node services: events and
//! their companion pending uploads, the append-only knowledge-base version
//! log, and device state.
//!
//! One SQLite file, accessed through diesel with an r2d2 pool. Writers are
//! partitioned by entity (the aggregator inserts events, the uploader
//! mutates pending uploads, the sync worker writes KB versions); SQLite's
//! single-writer serialization is the backstop, with WAL and a busy
//! timeout configured on every pooled connection.

pub mod error;
pub mod models;
pub mod schema;
mod store;

pub use error::StoreError;
pub use models::{PendingUpload, StoredEvent, UploadFields, UploadStatus};
pub use store::{DbPool, Store};

/// Rows in `PROCESSING` older than this at uploader startup are treated as
/// abandoned by a crashed run and reset to `PENDING_UPLOAD`.
pub const STALE_PROCESSING_THRESHOLD_SECS: u64 = 300;
