//! Endpoint implementations for the aggregator API.
//!
//! The aggregator is deliberately thin: it stamps identity onto producer
//! submissions, persists them, and exposes the queue. Status transitions it
//! accepts are validated against the allowed set but owned by the uploader.

use actix_web::{web, Error, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use vss_edge_core::{EventDocument, EventSubmission};
use vss_edge_store::{StoreError, UploadFields, UploadStatus};

use super::AppState;

/// Stored view returned from `POST /events/new`.
#[derive(Debug, Serialize)]
pub struct EventOut {
    pub event_id: String,
    pub camera_id: String,
    pub event_type: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub status: UploadStatus,
    pub local_clip_path: String,
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    pub limit: Option<i64>,
}

/// Body of `POST /events/mark_status`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub upload_id: String,
    pub status: UploadStatus,
    #[serde(default)]
    pub final_url: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub attempts: Option<u32>,
}

/// `POST /events/new`: accept a producer event, stamp identity from device
/// config, and enqueue it for upload.
pub async fn create_event(
    state: web::Data<AppState>,
    submission: web::Json<EventSubmission>,
) -> Result<HttpResponse, Error> {
    let submission = submission.into_inner();

    if !(0.0..=1.0).contains(&submission.confidence) {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Invalid confidence",
            "message": format!("confidence must be within [0, 1], got {}", submission.confidence)
        })));
    }

    let document = EventDocument::from_submission(
        submission,
        &state.config.device.tenant_id,
        &state.config.device.device_id,
        Utc::now(),
    );

    let store = state.store.clone();
    let insert_doc = document.clone();
    let result = web::block(move || {
        let clip_path = insert_doc.local_clip_path.clone();
        store.insert_event(&insert_doc, &clip_path)
    })
    .await?;

    match result {
        Ok((event_id, upload_id)) => {
            info!(%event_id, %upload_id, "event accepted");
            Ok(HttpResponse::Created().json(EventOut {
                event_id,
                camera_id: document.camera_id,
                event_type: document.event_type,
                timestamp: document.timestamp,
                status: UploadStatus::PendingUpload,
                local_clip_path: document.local_clip_path,
            }))
        }
        Err(StoreError::DuplicateEvent { event_id }) => {
            Ok(HttpResponse::Conflict().json(json!({
                "error": "Duplicate event",
                "event_id": event_id
            })))
        }
        Err(e) => {
            error!("failed to store event: {e}");
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Database storage failed",
                "message": e.to_string()
            })))
        }
    }
}

/// `GET /events/pending?limit=N`: rows still waiting for the uploader.
pub async fn pending_uploads(
    state: web::Data<AppState>,
    query: web::Query<PendingQuery>,
) -> Result<HttpResponse, Error> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1_000);
    let store = state.store.clone();

    match web::block(move || store.list_pending_uploads(limit)).await? {
        Ok(pending) => Ok(HttpResponse::Ok().json(pending)),
        Err(e) => {
            error!("failed to list pending uploads: {e}");
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Database query failed",
                "message": e.to_string()
            })))
        }
    }
}

/// `POST /events/mark_status`: validated status transition on behalf of
/// the uploader.
pub async fn mark_status(
    state: web::Data<AppState>,
    update: web::Json<StatusUpdate>,
) -> Result<HttpResponse, Error> {
    let update = update.into_inner();

    // PENDING_UPLOAD is an internal starting state, not a valid target here.
    if update.status == UploadStatus::PendingUpload {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "Invalid status",
            "message": "status must be one of PROCESSING, FAILED, UPLOADED"
        })));
    }

    let store = state.store.clone();
    let upload_id = update.upload_id.clone();
    let result = web::block(move || {
        store.update_upload(
            &update.upload_id,
            update.status,
            UploadFields {
                final_url: update.final_url,
                checksum: update.checksum,
                attempts: update.attempts.map(|a| a as i32),
            },
        )
    })
    .await?;

    match result {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({
            "message": format!("Upload {} status updated", upload_id)
        }))),
        Err(StoreError::UploadNotFound { upload_id }) => {
            Ok(HttpResponse::NotFound().json(json!({
                "error": "Unknown upload",
                "upload_id": upload_id
            })))
        }
        Err(StoreError::InvalidTransition { upload_id, from, to }) => {
            Ok(HttpResponse::Conflict().json(json!({
                "error": "Invalid transition",
                "upload_id": upload_id,
                "from": from,
                "to": to
            })))
        }
        Err(e) => {
            error!("failed to mark upload status: {e}");
            Ok(HttpResponse::InternalServerError().json(json!({
                "error": "Database update failed",
                "message": e.to_string()
            })))
        }
    }
}

/// `GET /health`: liveness plus the config-loaded bit.
pub async fn health(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().json(json!({
        "status": "ok",
        "db_path": state.config.storage.db_path.display().to_string(),
        "config_loaded": true
    })))
}
