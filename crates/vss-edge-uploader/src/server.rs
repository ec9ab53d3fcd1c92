//! Liveness endpoint for the uploader service. Queue counts are included
//! so the watchdog (and operators) can see permanent failures building up.

use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::json;
use tracing::info;

use vss_edge_store::{Store, UploadStatus};

async fn health(store: web::Data<Store>) -> HttpResponse {
    let counts = web::block({
        let store = store.get_ref().clone();
        move || -> Result<(i64, i64), vss_edge_store::StoreError> {
            Ok((
                store.count_uploads(UploadStatus::PendingUpload)?,
                store.count_uploads(UploadStatus::Failed)?,
            ))
        }
    })
    .await;

    match counts {
        Ok(Ok((pending, failed))) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "service": "uploader",
            "pending_uploads": pending,
            "failed_uploads": failed,
        })),
        _ => HttpResponse::ServiceUnavailable().json(json!({
            "status": "degraded",
            "service": "uploader",
            "error": "store unavailable",
        })),
    }
}

/// Serve `/health` until the process stops.
pub async fn run_health_server(store: Store, port: u16) -> std::io::Result<()> {
    let data = web::Data::new(store);
    info!(port, "uploader health endpoint listening");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(web::resource("/health").route(web::get().to(health)))
    })
    .bind(("0.0.0.0", port))?;
    server.run().await
}
