//! Liveness endpoint for the control-plane service.

use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::json;
use tracing::info;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "control",
    }))
}

/// Serve `/health` until the process stops.
pub async fn run_health_server(port: u16) -> std::io::Result<()> {
    info!(port, "control health endpoint listening");
    let server = HttpServer::new(|| {
        App::new().service(web::resource("/health").route(web::get().to(health)))
    })
    .bind(("0.0.0.0", port))?;
    server.run().await
}
