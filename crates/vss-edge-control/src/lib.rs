//! # VSS Edge Control
//!
//! The control-plane client: connects to the message bus (mTLS when
//! configured), publishes heartbeats, subscribes to the device's control
//! topic, and dispatches `request_clip` commands to the ingest service,
//! re-entering the delivery pipeline.
//!
//! The network loop runs on its own task; publishes from other tasks go
//! through the cloneable client handle's internal queue, never directly on
//! the network task.

pub mod client;
pub mod error;
pub mod handlers;
pub mod heartbeat;
pub mod messages;
pub mod server;

pub use client::ControlPlaneClient;
pub use error::ControlError;
pub use messages::ControlMessage;
