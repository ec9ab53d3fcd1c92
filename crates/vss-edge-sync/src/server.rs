//! Liveness endpoint and the forced-sync trigger for the sync service.

use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::info;

use vss_edge_store::Store;

struct SyncServerState {
    store: Store,
    force_tx: mpsc::Sender<()>,
}

async fn health(state: web::Data<SyncServerState>) -> HttpResponse {
    let store = state.store.clone();
    match web::block(move || store.current_kb_version()).await {
        Ok(Ok(kb_version)) => HttpResponse::Ok().json(json!({
            "status": "ok",
            "service": "sync",
            "kb_version": kb_version,
        })),
        _ => HttpResponse::ServiceUnavailable().json(json!({
            "status": "degraded",
            "service": "sync",
            "error": "store unavailable",
        })),
    }
}

async fn force_sync(state: web::Data<SyncServerState>) -> HttpResponse {
    match state.force_tx.try_send(()) {
        Ok(()) => HttpResponse::Accepted().json(json!({"message": "sync scheduled"})),
        Err(_) => HttpResponse::Accepted().json(json!({"message": "sync already pending"})),
    }
}

/// Serve `/health` and `POST /sync/force` until the process stops.
pub async fn run_server(store: Store, force_tx: mpsc::Sender<()>, port: u16) -> std::io::Result<()> {
    let data = web::Data::new(SyncServerState { store, force_tx });
    info!(port, "sync service endpoints listening");
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(web::resource("/health").route(web::get().to(health)))
            .service(web::resource("/sync/force").route(web::post().to(force_sync)))
    })
    .bind(("0.0.0.0", port))?;
    server.run().await
}
