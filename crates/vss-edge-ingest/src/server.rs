//! HTTP adapter for the ingest service: liveness, camera status, and
//! on-demand clip extraction. The supervisor stays HTTP-free; this layer
//! only translates requests.

use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::IngestError;
use crate::events::AggregatorClient;
use crate::supervisor::IngestSupervisor;

pub struct IngestServerState {
    pub supervisor: Arc<IngestSupervisor>,
    pub aggregator: AggregatorClient,
}

/// Body of `POST /clips/extract`.
#[derive(Debug, Deserialize)]
pub struct ClipRequest {
    pub camera_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub request_id: Option<String>,
}

async fn health(state: web::Data<IngestServerState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "ingest",
        "cameras": state.supervisor.camera_count(),
        "ingest_paused": state.supervisor.paused(),
    }))
}

async fn cameras(state: web::Data<IngestServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.supervisor.camera_statuses().await)
}

async fn extract_clip(
    state: web::Data<IngestServerState>,
    request: web::Json<ClipRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    if request.to <= request.from {
        return HttpResponse::BadRequest().json(json!({
            "error": "Invalid range",
            "message": "'to' must be after 'from'"
        }));
    }

    match state
        .supervisor
        .extract_and_submit(&state.aggregator, &request.camera_id, request.from, request.to)
        .await
    {
        Ok((clip_path, event_id)) => {
            info!(
                camera_id = %request.camera_id,
                %event_id,
                request_id = request.request_id.as_deref().unwrap_or("-"),
                "clip extracted and enqueued"
            );
            HttpResponse::Ok().json(json!({
                "clip_path": clip_path.display().to_string(),
                "event_id": event_id,
                "request_id": request.request_id,
            }))
        }
        Err(e @ IngestError::NoSegments { .. }) => HttpResponse::NotFound().json(json!({
            "error": "No matching segments",
            "message": e.to_string(),
        })),
        Err(e) => {
            error!(camera_id = %request.camera_id, "clip extraction failed: {e}");
            HttpResponse::InternalServerError().json(json!({
                "error": "Extraction failed",
                "message": e.to_string(),
            }))
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)));
    cfg.service(web::resource("/cameras").route(web::get().to(cameras)));
    cfg.service(web::resource("/clips/extract").route(web::post().to(extract_clip)));
}

/// Serve the ingest HTTP adapter until the process stops.
pub async fn run_server(
    supervisor: Arc<IngestSupervisor>,
    aggregator: AggregatorClient,
    port: u16,
) -> std::io::Result<()> {
    let state = web::Data::new(IngestServerState {
        supervisor,
        aggregator,
    });
    info!(port, "ingest service listening");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
