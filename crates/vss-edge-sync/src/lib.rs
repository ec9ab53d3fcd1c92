//! # VSS Edge Sync
//!
//! Periodic synchronization of signed model packages and knowledge-base
//! deltas from the central API.
//!
//! Package installation is a transaction: download, SHA-256 check, Ed25519
//! signature check, staged extraction, atomic swap into the model root,
//! then a hot-reload POST to the CV engine. If any step fails, on-disk and
//! store state end up as if the update had never been attempted; staging
//! artifacts are always removed.

pub mod client;
pub mod error;
pub mod installer;
pub mod server;
pub mod verify;
pub mod worker;

pub use client::SyncApiClient;
pub use error::SyncError;
pub use verify::PackageVerifier;
pub use worker::SyncWorker;
