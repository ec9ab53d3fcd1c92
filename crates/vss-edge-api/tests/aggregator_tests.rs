//! Aggregator endpoint behavior against a real store on a temp database.

use std::sync::Arc;

use actix_web::{test, web, App};
use serde_json::json;
use tempfile::TempDir;

use vss_edge_api::aggregator::{routes, AppState};
use vss_edge_core::EdgeConfig;
use vss_edge_store::{Store, UploadStatus};

const CONFIG_YAML: &str = r#"
device:
  device_id: thor-mini-001
  tenant_id: acme
  location: "Warehouse 12"
  keep_local_days: 7
  max_disk_usage_percent: 85
network:
  mqtt_broker: broker.example.com
  mqtt_port: 1883
  mqtt_tls: false
  mqtt_topic_prefix: vss/events
  api_base: https://central.example.com
  api_timeout_seconds: 30
  use_mtls: false
  cert_paths:
    client_cert: /etc/vss/certs/client.pem
    client_key: /etc/vss/certs/client.key
    ca_cert: /etc/vss/certs/ca.pem
nvr_list: []
ingest:
  chunk_seconds: 30
  max_local_clips: 5000
upload:
  presigned_endpoint: /api/v1/upload-request
  metadata_endpoint: /api/v1/metadata
  upload_complete_endpoint: /api/v1/upload-complete
  max_retries: 3
  retry_backoff_seconds: 5
sync:
  packages_endpoint: /api/v1/training-packages
  kb_manifest_endpoint: /api/v1/knowledge/manifest
  poll_interval_seconds: 300
"#;

fn test_state(dir: &TempDir) -> (web::Data<AppState>, Store) {
    let config = Arc::new(EdgeConfig::from_yaml(CONFIG_YAML).expect("valid fixture"));
    let store = Store::open(&dir.path().join("vss_events.db")).unwrap();
    store.initialize().unwrap();
    let state = web::Data::new(AppState {
        config,
        store: store.clone(),
    });
    (state, store)
}

fn submission() -> serde_json::Value {
    json!({
        "camera_id": "cam-01",
        "event_type": "motion",
        "timestamp": "2025-11-16T10:02:30Z",
        "local_clip_path": "/tmp/test_clip.mp4",
        "objects": [],
        "dense_caption": "A test event",
        "audio_text": null,
        "confidence": 0.9
    })
}

#[actix_web::test]
async fn create_event_returns_stored_view() {
    let dir = TempDir::new().unwrap();
    let (state, store) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/events/new")
        .set_json(submission())
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let event_id = body["event_id"].as_str().unwrap();
    assert!(event_id.starts_with("evt-"));
    assert_eq!(body["status"], "PENDING_UPLOAD");
    assert_eq!(body["camera_id"], "cam-01");

    // Identity was stamped from device config before persisting.
    let stored = store.get_event(event_id).unwrap().unwrap();
    assert_eq!(stored.document.tenant_id, "acme");
    assert_eq!(stored.document.device_id, "thor-mini-001");
}

#[actix_web::test]
async fn out_of_range_confidence_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    let mut body = submission();
    body["confidence"] = json!(1.5);
    let req = test::TestRequest::post()
        .uri("/events/new")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn pending_listing_returns_enqueued_uploads() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/events/new")
        .set_json(submission())
        .to_request();
    test::call_service(&app, req).await;

    let req = test::TestRequest::get()
        .uri("/events/pending?limit=10")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "PENDING_UPLOAD");
    assert_eq!(rows[0]["filepath"], "/tmp/test_clip.mp4");
    assert!(rows[0]["upload_id"].as_str().unwrap().starts_with("upload-evt-"));
}

#[actix_web::test]
async fn mark_status_transitions_and_mirrors() {
    let dir = TempDir::new().unwrap();
    let (state, store) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/events/new")
        .set_json(submission())
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let event_id = body["event_id"].as_str().unwrap().to_string();
    let upload_id = format!("upload-{event_id}");

    let req = test::TestRequest::post()
        .uri("/events/mark_status")
        .set_json(json!({
            "upload_id": upload_id,
            "status": "UPLOADED",
            "final_url": "https://cdn.example.com/u1",
            "checksum": "abc123",
            "attempts": 1
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let event = store.get_event(&event_id).unwrap().unwrap();
    assert_eq!(event.status, UploadStatus::Uploaded);
}

#[actix_web::test]
async fn mark_status_rejects_disallowed_states() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    // PENDING_UPLOAD is not an allowed target.
    let req = test::TestRequest::post()
        .uri("/events/mark_status")
        .set_json(json!({"upload_id": "upload-x", "status": "PENDING_UPLOAD"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // Unknown status text fails typed deserialization.
    let req = test::TestRequest::post()
        .uri("/events/mark_status")
        .set_json(json!({"upload_id": "upload-x", "status": "COMPLETE"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn mark_status_unknown_upload_is_404() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/events/mark_status")
        .set_json(json!({"upload_id": "upload-missing", "status": "PROCESSING"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn health_reports_config_loaded() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = test::init_service(App::new().app_data(state).configure(routes)).await;

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["config_loaded"], true);
}
