//! The aggregator service: HTTP adapter over the durable store.

pub mod handlers;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use tracing::info;

use vss_edge_core::EdgeConfig;
use vss_edge_store::Store;

/// Shared state handed to every handler.
pub struct AppState {
    pub config: Arc<EdgeConfig>,
    pub store: Store,
}

/// Register the aggregator routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/events/new").route(web::post().to(handlers::create_event)));
    cfg.service(web::resource("/events/pending").route(web::get().to(handlers::pending_uploads)));
    cfg.service(web::resource("/events/mark_status").route(web::post().to(handlers::mark_status)));
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)));
}

/// Run the aggregator HTTP server until the process is stopped.
pub async fn run(config: Arc<EdgeConfig>, store: Store, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(AppState {
        config: config.clone(),
        store,
    });

    info!(port, "aggregator service listening");
    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
