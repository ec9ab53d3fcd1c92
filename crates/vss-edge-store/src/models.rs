//! Record structs mapped to the store tables and the domain types exposed
//! to the services. Database records keep diesel-native column types;
//! conversions to the domain views live beside them.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use vss_edge_core::EventDocument;

use crate::error::{StoreError, StoreResult};

/// Lifecycle state of a pending upload (and, mirrored, of its event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    PendingUpload,
    Processing,
    Uploaded,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::PendingUpload => "PENDING_UPLOAD",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Uploaded => "UPLOADED",
            UploadStatus::Failed => "FAILED",
        }
    }

    /// Terminal states are mirrored into the companion event and never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Uploaded | UploadStatus::Failed)
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UploadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_UPLOAD" => Ok(UploadStatus::PendingUpload),
            "PROCESSING" => Ok(UploadStatus::Processing),
            "UPLOADED" => Ok(UploadStatus::Uploaded),
            "FAILED" => Ok(UploadStatus::Failed),
            other => Err(format!("unknown upload status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::events)]
pub struct EventRecord {
    pub event_id: String,
    pub json: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::pending_uploads)]
pub struct PendingUploadRecord {
    pub upload_id: String,
    pub event_id: String,
    pub filepath: String,
    pub attempts: i32,
    pub last_attempt_ts: Option<NaiveDateTime>,
    pub status: String,
    pub checksum: Option<String>,
    pub final_url: Option<String>,
}

/// Optional column updates applied together with a status transition.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = crate::schema::pending_uploads)]
pub struct UploadFields {
    pub final_url: Option<String>,
    pub checksum: Option<String>,
    pub attempts: Option<i32>,
}

#[derive(Debug, Clone, Queryable)]
pub struct KbMetaRecord {
    pub id: i32,
    pub kb_version: String,
    pub applied_at: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::kb_meta)]
pub struct NewKbMeta {
    pub kb_version: String,
    pub applied_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::device_state)]
pub struct DeviceStateRecord {
    pub device_id: String,
    pub last_heartbeat: NaiveDateTime,
    pub versions: String,
}

/// A pending upload as seen by the uploader and the aggregator API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingUpload {
    pub upload_id: String,
    pub event_id: String,
    pub filepath: String,
    pub attempts: u32,
    pub last_attempt_ts: Option<DateTime<Utc>>,
    pub status: UploadStatus,
    pub checksum: Option<String>,
    pub final_url: Option<String>,
}

impl From<PendingUploadRecord> for PendingUpload {
    fn from(record: PendingUploadRecord) -> Self {
        Self {
            upload_id: record.upload_id,
            event_id: record.event_id,
            filepath: record.filepath,
            attempts: record.attempts.max(0) as u32,
            last_attempt_ts: record.last_attempt_ts.map(|ts| Utc.from_utc_datetime(&ts)),
            // Unknown status text in the store means a failed migration or
            // manual edit; treat the row as failed rather than poisoning
            // the queue.
            status: record.status.parse().unwrap_or(UploadStatus::Failed),
            checksum: record.checksum,
            final_url: record.final_url,
        }
    }
}

/// A stored event with its parsed document.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEvent {
    pub event_id: String,
    pub document: EventDocument,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRecord> for StoredEvent {
    type Error = StoreError;

    fn try_from(record: EventRecord) -> StoreResult<Self> {
        let document: EventDocument = serde_json::from_str(&record.json)
            .map_err(|e| StoreError::CorruptDocument(format!("{}: {}", record.event_id, e)))?;
        Ok(Self {
            event_id: record.event_id,
            document,
            status: record.status.parse().unwrap_or(UploadStatus::Failed),
            created_at: Utc.from_utc_datetime(&record.created_at),
            updated_at: Utc.from_utc_datetime(&record.updated_at),
        })
    }
}
