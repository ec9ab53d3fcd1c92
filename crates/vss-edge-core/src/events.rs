//! The event document exchanged between producers, the aggregator and the
//! central API.
//!
//! The store keeps the document opaque (a JSON string column); this module
//! is the typed boundary. [`EventSubmission`] is what a producer (the CV
//! engine or the ingest service) POSTs; [`EventDocument`] is the full
//! record after the aggregator stamps identity fields from device config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Producer-side event payload, before the aggregator assigns identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSubmission {
    pub camera_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub local_clip_path: String,
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
    #[serde(default)]
    pub dense_caption: Option<String>,
    #[serde(default)]
    pub audio_text: Option<String>,
    pub confidence: f64,
}

/// The full event document as persisted and shipped to the central API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDocument {
    pub tenant_id: String,
    pub device_id: String,
    pub camera_id: String,
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub objects: Vec<serde_json::Value>,
    #[serde(default)]
    pub dense_caption: Option<String>,
    #[serde(default)]
    pub audio_text: Option<String>,
    pub local_clip_path: String,
    pub confidence: f64,
}

impl EventDocument {
    /// Build the full document from a producer submission, stamping tenant
    /// and device identity and assigning a fresh event id.
    pub fn from_submission(
        submission: EventSubmission,
        tenant_id: &str,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            device_id: device_id.to_string(),
            camera_id: submission.camera_id,
            event_id: generate_event_id(now),
            timestamp: submission.timestamp,
            event_type: submission.event_type,
            objects: submission.objects,
            dense_caption: submission.dense_caption,
            audio_text: submission.audio_text,
            local_clip_path: submission.local_clip_path,
            confidence: submission.confidence,
        }
    }
}

/// Device-assigned event id: `evt-YYYYMMDD-HHMMSS-<4 hex>`.
pub fn generate_event_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("evt-{}-{}", now.format("%Y%m%d-%H%M%S"), &suffix[..4])
}
