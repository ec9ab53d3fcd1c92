//! End-to-end upload transactions against a mock central server: happy
//! path, transient retry, permanent failure, missing clip, and
//! server-assigned upload ids.

use std::sync::Arc;
use std::time::Instant;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vss_edge_core::checksum::sha256_bytes;
use vss_edge_core::{EdgeConfig, EventDocument};
use vss_edge_store::{Store, UploadStatus};
use vss_edge_uploader::Uploader;

const CLIP_CONTENT: &[u8] = b"This is a mock video clip content for testing upload.";

fn config_for(api_base: &str) -> Arc<EdgeConfig> {
    let yaml = format!(
        r#"
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
  api_base: {api_base}
  api_timeout_seconds: 5
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
  retry_backoff_seconds: 1
sync:
  packages_endpoint: /api/v1/training-packages
  kb_manifest_endpoint: /api/v1/knowledge/manifest
  poll_interval_seconds: 300
"#
    );
    Arc::new(EdgeConfig::from_yaml(&yaml).expect("valid fixture"))
}

struct Fixture {
    dir: TempDir,
    store: Store,
    uploader: Uploader,
}

fn fixture(api_base: &str) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Store::open(&dir.path().join("vss_events.db")).unwrap();
    store.initialize().unwrap();
    let uploader = Uploader::new(config_for(api_base), store.clone()).unwrap();
    Fixture {
        dir,
        store,
        uploader,
    }
}

fn insert_clip_event(fixture: &Fixture, event_id: &str, clip_path: &str) -> String {
    let document = EventDocument {
        tenant_id: "acme".into(),
        device_id: "thor-mini-001".into(),
        camera_id: "cam-01".into(),
        event_id: event_id.into(),
        timestamp: Utc.with_ymd_and_hms(2025, 11, 16, 10, 2, 30).unwrap(),
        event_type: "motion".into(),
        objects: vec![],
        dense_caption: Some("A test event".into()),
        audio_text: None,
        local_clip_path: clip_path.into(),
        confidence: 0.9,
    };
    let (_, upload_id) = fixture.store.insert_event(&document, clip_path).unwrap();
    upload_id
}

fn write_clip(fixture: &Fixture, name: &str) -> String {
    let clip_path = fixture.dir.path().join(name);
    std::fs::write(&clip_path, CLIP_CONTENT).unwrap();
    clip_path.display().to_string()
}

async fn mount_success_protocol(server: &MockServer, upload_id_in_response: Option<&str>) {
    let mut presign_body = serde_json::json!({
        "upload_url": format!("{}/mock-upload/u1", server.uri()),
        "final_url": "https://cdn.example.com/u1",
    });
    if let Some(id) = upload_id_in_response {
        presign_body["upload_id"] = serde_json::json!(id);
    }

    Mock::given(method("POST"))
        .and(path("/api/v1/upload-request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(presign_body))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/mock-upload/u1"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-complete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Upload completion acknowledged"
        })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": "Metadata received"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn happy_path_reaches_uploaded() {
    let server = MockServer::start().await;
    mount_success_protocol(&server, None).await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let upload_id = insert_clip_event(&fixture, "evt-20251116-100230-0001", &clip_path);

    let processed = fixture.uploader.step().await.unwrap();
    assert_eq!(processed, 1);

    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Uploaded);
    assert_eq!(upload.final_url.as_deref(), Some("https://cdn.example.com/u1"));
    assert_eq!(upload.checksum.as_deref(), Some(sha256_bytes(CLIP_CONTENT).as_str()));

    let event = fixture
        .store
        .get_event("evt-20251116-100230-0001")
        .unwrap()
        .unwrap();
    assert_eq!(event.status, UploadStatus::Uploaded);

    // Wire-level assertions: the PUT carried the exact clip bytes and the
    // checksum header; the metadata POST carried the augmented document.
    let requests = server.received_requests().await.unwrap();

    let presign = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/upload-request")
        .expect("presign request");
    assert_eq!(
        presign.headers.get("Event-ID").unwrap(),
        "evt-20251116-100230-0001"
    );
    let presign_body: serde_json::Value = serde_json::from_slice(&presign.body).unwrap();
    assert_eq!(presign_body["tenant_id"], "acme");
    assert_eq!(presign_body["filename"], "clip.mp4");
    assert_eq!(presign_body["size_bytes"], CLIP_CONTENT.len());
    assert_eq!(presign_body["content_type"], "video/mp4");

    let put = requests
        .iter()
        .find(|r| r.method.to_string() == "PUT")
        .expect("put request");
    assert_eq!(put.body, CLIP_CONTENT);
    assert_eq!(
        put.headers.get("x-amz-checksum-sha256").unwrap(),
        sha256_bytes(CLIP_CONTENT).as_str()
    );
    assert_eq!(put.headers.get("content-type").unwrap(), "video/mp4");

    let metadata = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/metadata")
        .expect("metadata request");
    let metadata_body: serde_json::Value = serde_json::from_slice(&metadata.body).unwrap();
    assert_eq!(metadata_body["event_id"], "evt-20251116-100230-0001");
    assert_eq!(metadata_body["clip_url"], "https://cdn.example.com/u1");
    assert_eq!(metadata_body["camera_id"], "cam-01");
}

#[tokio::test]
async fn transient_5xx_retries_then_succeeds() {
    let server = MockServer::start().await;

    // First presign attempt fails with 503; everything after succeeds.
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-request"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_success_protocol(&server, None).await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let upload_id = insert_clip_event(&fixture, "evt-20251116-100230-0002", &clip_path);

    // First pass: 503, one backoff sleep in [1, 2] s, row back to pending.
    let started = Instant::now();
    fixture.uploader.step().await.unwrap();
    let elapsed = started.elapsed().as_secs_f64();
    assert!(elapsed >= 1.0, "backoff sleep was only {elapsed:.2}s");

    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::PendingUpload);
    assert_eq!(upload.attempts, 1);

    // Second pass: success with the attempt count preserved.
    fixture.uploader.step().await.unwrap();
    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Uploaded);
    assert_eq!(upload.attempts, 1);
}

#[tokio::test]
async fn client_4xx_is_permanent_without_sleep() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-request"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let upload_id = insert_clip_event(&fixture, "evt-20251116-100230-0003", &clip_path);

    let started = Instant::now();
    fixture.uploader.step().await.unwrap();
    assert!(
        started.elapsed().as_secs_f64() < 1.0,
        "no retry sleep may happen on 4xx"
    );

    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
    assert_eq!(upload.attempts, 1);

    let event = fixture
        .store
        .get_event("evt-20251116-100230-0003")
        .unwrap()
        .unwrap();
    assert_eq!(event.status, UploadStatus::Failed);

    // Only the presign step ran.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn missing_clip_fails_without_network() {
    let server = MockServer::start().await;
    let fixture = fixture(&server.uri());
    let upload_id = insert_clip_event(
        &fixture,
        "evt-20251116-100230-0004",
        "/nonexistent/clip.mp4",
    );

    fixture.uploader.step().await.unwrap();

    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
    assert_eq!(upload.attempts, 0);

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty(), "no HTTP call may happen");
}

#[tokio::test]
async fn server_assigned_upload_id_is_used_everywhere() {
    let server = MockServer::start().await;
    mount_success_protocol(&server, Some("mock-upload-1")).await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let local_id = insert_clip_event(&fixture, "evt-20251116-100230-0005", &clip_path);

    fixture.uploader.step().await.unwrap();

    // The local row was renamed to the server-assigned id.
    assert!(fixture.store.get_upload(&local_id).unwrap().is_none());
    let upload = fixture.store.get_upload("mock-upload-1").unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Uploaded);

    let requests = server.received_requests().await.unwrap();
    let complete = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/upload-complete")
        .expect("complete request");
    let complete_body: serde_json::Value = serde_json::from_slice(&complete.body).unwrap();
    assert_eq!(complete_body["upload_id"], "mock-upload-1");

    let metadata = requests
        .iter()
        .find(|r| r.url.path() == "/api/v1/metadata")
        .expect("metadata request");
    let metadata_body: serde_json::Value = serde_json::from_slice(&metadata.body).unwrap();
    assert_eq!(metadata_body["upload_id"], "mock-upload-1");
}

#[tokio::test]
async fn presign_response_without_urls_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "upload_id": "mock-upload-1"
        })))
        .mount(&server)
        .await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let upload_id = insert_clip_event(&fixture, "evt-20251116-100230-0006", &clip_path);

    fixture.uploader.step().await.unwrap();

    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
}

#[tokio::test]
async fn attempts_cap_marks_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-request"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let upload_id = insert_clip_event(&fixture, "evt-20251116-100230-0007", &clip_path);

    // max_retries = 3: attempts 1 and 2 requeue, attempt 3 is terminal.
    for _ in 0..3 {
        fixture.uploader.step().await.unwrap();
    }

    let upload = fixture.store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Failed);
    assert_eq!(upload.attempts, 3);
    assert!(upload.attempts <= 3 + 1, "attempt invariant");
}

#[tokio::test]
async fn one_rows_failure_never_blocks_another() {
    let server = MockServer::start().await;
    mount_success_protocol(&server, None).await;

    let fixture = fixture(&server.uri());
    let clip_path = write_clip(&fixture, "clip.mp4");
    let missing_id = insert_clip_event(
        &fixture,
        "evt-20251116-100230-0008",
        "/nonexistent/clip.mp4",
    );
    let good_id = insert_clip_event(&fixture, "evt-20251116-100231-0008", &clip_path);

    fixture.uploader.step().await.unwrap();

    assert_eq!(
        fixture.store.get_upload(&missing_id).unwrap().unwrap().status,
        UploadStatus::Failed
    );
    assert_eq!(
        fixture.store.get_upload(&good_id).unwrap().unwrap().status,
        UploadStatus::Uploaded
    );
}
