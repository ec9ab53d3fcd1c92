//! Durable-store behavior: crash-safe transitions, the row lease, terminal
//! mirroring, and recovery across reopen.

use std::sync::{Arc, Barrier};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use vss_edge_core::EventDocument;
use vss_edge_store::{Store, UploadFields, UploadStatus, STALE_PROCESSING_THRESHOLD_SECS};

fn open_store(dir: &TempDir) -> Store {
    let store = Store::open(&dir.path().join("vss_events.db")).expect("open store");
    store.initialize().expect("initialize schema");
    store
}

fn document(event_id: &str) -> EventDocument {
    EventDocument {
        tenant_id: "acme".into(),
        device_id: "thor-mini-001".into(),
        camera_id: "cam-01".into(),
        event_id: event_id.into(),
        timestamp: Utc.with_ymd_and_hms(2025, 11, 16, 10, 2, 30).unwrap(),
        event_type: "motion".into(),
        objects: vec![],
        dense_caption: Some("A test event".into()),
        audio_text: None,
        local_clip_path: "/tmp/test_clip.mp4".into(),
        confidence: 0.9,
    }
}

#[test]
fn initialize_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.initialize().expect("second initialize must succeed");
}

#[test]
fn insert_creates_both_rows_pending() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    let (event_id, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/test_clip.mp4")
        .unwrap();
    assert_eq!(event_id, "evt-20251116-100230-0001");
    assert_eq!(upload_id, "upload-evt-20251116-100230-0001");

    let upload = store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::PendingUpload);
    assert_eq!(upload.attempts, 0);
    assert_eq!(upload.event_id, event_id);

    let event = store.get_event(&event_id).unwrap().unwrap();
    assert_eq!(event.status, UploadStatus::PendingUpload);
    assert_eq!(event.document.camera_id, "cam-01");
}

#[test]
fn duplicate_event_id_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();
    let err = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/b.mp4")
        .unwrap_err();
    assert!(err.to_string().contains("evt-20251116-100230-0001"));

    // The failed insert must not leave a second pending upload behind.
    let pending = store.list_pending_uploads(10).unwrap();
    assert_eq!(pending.len(), 1);
}

#[test]
fn lease_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();

    assert!(store.claim_upload(&upload_id).unwrap());
    assert!(!store.claim_upload(&upload_id).unwrap());

    let upload = store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Processing);
    assert!(upload.last_attempt_ts.is_some());
}

#[test]
fn concurrent_claimants_produce_one_winner() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let upload_id = upload_id.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                store.claim_upload(&upload_id).unwrap()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn terminal_status_mirrors_into_event() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (event_id, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();

    assert!(store.claim_upload(&upload_id).unwrap());
    store
        .update_upload(
            &upload_id,
            UploadStatus::Uploaded,
            UploadFields {
                final_url: Some("https://cdn.example.com/u1".into()),
                checksum: Some("abc123".into()),
                attempts: None,
            },
        )
        .unwrap();

    let upload = store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::Uploaded);
    assert_eq!(upload.final_url.as_deref(), Some("https://cdn.example.com/u1"));
    assert_eq!(upload.checksum.as_deref(), Some("abc123"));

    let event = store.get_event(&event_id).unwrap().unwrap();
    assert_eq!(event.status, UploadStatus::Uploaded);
}

#[test]
fn terminal_rows_never_move_again() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();

    store.claim_upload(&upload_id).unwrap();
    store
        .update_upload(&upload_id, UploadStatus::Failed, UploadFields::default())
        .unwrap();

    let err = store
        .update_upload(
            &upload_id,
            UploadStatus::PendingUpload,
            UploadFields::default(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("cannot move"), "got: {err}");
}

#[test]
fn server_assigned_upload_id_replaces_local() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (event_id, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();

    store.claim_upload(&upload_id).unwrap();
    store
        .replace_upload_id(&upload_id, "mock-upload-1", "deadbeef")
        .unwrap();

    assert!(store.get_upload(&upload_id).unwrap().is_none());
    let replaced = store.get_upload("mock-upload-1").unwrap().unwrap();
    assert_eq!(replaced.event_id, event_id);
    assert_eq!(replaced.checksum.as_deref(), Some("deadbeef"));
    assert_eq!(replaced.status, UploadStatus::Processing);
}

#[test]
fn stalled_processing_rows_recover_with_attempts_intact() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let (_, upload_id) = store
        .insert_event(&document("evt-20251116-100230-0001"), "/tmp/a.mp4")
        .unwrap();

    store.claim_upload(&upload_id).unwrap();
    store
        .update_upload(
            &upload_id,
            UploadStatus::Processing,
            UploadFields {
                attempts: Some(2),
                ..UploadFields::default()
            },
        )
        .unwrap();

    // A fresh lease is not stalled yet.
    let recent = store
        .reset_stalled_uploads(Duration::from_secs(STALE_PROCESSING_THRESHOLD_SECS))
        .unwrap();
    assert_eq!(recent, 0);

    // Crash recovery with a zero threshold reclaims it.
    std::thread::sleep(Duration::from_millis(20));
    let reset = store.reset_stalled_uploads(Duration::from_secs(0)).unwrap();
    assert_eq!(reset, 1);

    let upload = store.get_upload(&upload_id).unwrap().unwrap();
    assert_eq!(upload.status, UploadStatus::PendingUpload);
    assert_eq!(upload.attempts, 2);
}

#[test]
fn kb_version_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("vss_events.db");
    {
        let store = Store::open(&db_path).unwrap();
        store.initialize().unwrap();
        assert_eq!(store.current_kb_version().unwrap(), "0.0.0");
        store.record_kb_version("20251116.1").unwrap();
        assert_eq!(store.current_kb_version().unwrap(), "20251116.1");
    }

    // Simulated crash/restart: a brand-new pool on the same file.
    let reopened = Store::open(&db_path).unwrap();
    reopened.initialize().unwrap();
    assert_eq!(reopened.current_kb_version().unwrap(), "20251116.1");
}

#[test]
fn device_state_tracks_heartbeat_and_versions() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    store.record_heartbeat("thor-mini-001").unwrap();
    assert_eq!(
        store.service_version("thor-mini-001", "model").unwrap(),
        None
    );

    store
        .record_service_version("thor-mini-001", "model", "v2.0")
        .unwrap();
    store
        .record_service_version("thor-mini-001", "kb", "20251116.1")
        .unwrap();
    assert_eq!(
        store.service_version("thor-mini-001", "model").unwrap(),
        Some("v2.0".to_string())
    );
    assert_eq!(
        store.service_version("thor-mini-001", "kb").unwrap(),
        Some("20251116.1".to_string())
    );

    // Heartbeat again on the existing row.
    store.record_heartbeat("thor-mini-001").unwrap();
}

#[test]
fn pending_listing_respects_limit_and_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    for n in [3, 1, 2] {
        store
            .insert_event(
                &document(&format!("evt-20251116-10023{n}-0001")),
                "/tmp/a.mp4",
            )
            .unwrap();
    }

    let pending = store.list_pending_uploads(2).unwrap();
    assert_eq!(pending.len(), 2);
    assert!(pending[0].upload_id < pending[1].upload_id);
}
