//! # VSS Edge API
//!
//! The HTTP surfaces owned by the edge node:
//!
//! - [`aggregator`]: the narrow CRUD surface over the event/upload queue.
//!   Producers (the CV engine, the ingest service) POST events here; the
//!   uploader can inspect and mark rows through it. The upload state
//!   machine itself lives in the uploader service, not here.
//! - [`watchdog`]: aggregated health over every local service with a
//!   pluggable restart hook for the process manager.

pub mod aggregator;
pub mod watchdog;
