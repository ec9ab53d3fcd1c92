//! The ingest supervisor: one camera worker task per configured camera, a
//! shared disk-budget task, and the clip-extraction entry point used by
//! the HTTP adapter and (through it) the control-plane client.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::info;

use vss_edge_core::rtsp::resolve_rtsp_urls;
use vss_edge_core::{EdgeConfig, EventSubmission};

use crate::clips;
use crate::disk::DiskBudget;
use crate::error::IngestError;
use crate::events::AggregatorClient;
use crate::segmenter::{CameraStatus, CameraWorker};

pub struct IngestSupervisor {
    config: Arc<EdgeConfig>,
    pause: Arc<AtomicBool>,
    statuses: Vec<Arc<RwLock<CameraStatus>>>,
    camera_dirs: HashMap<String, PathBuf>,
    workers: Vec<CameraWorker>,
}

impl IngestSupervisor {
    /// Resolve RTSP URLs and prepare one worker per camera. No child
    /// processes are spawned until [`IngestSupervisor::spawn_all`].
    pub fn new(config: Arc<EdgeConfig>) -> Self {
        let pause = Arc::new(AtomicBool::new(false));
        let urls = resolve_rtsp_urls(&config.nvr_list);

        let device_base = config
            .storage
            .clip_base
            .join(&config.device.tenant_id)
            .join(&config.device.device_id);

        let mut workers = Vec::new();
        let mut statuses = Vec::new();
        let mut camera_dirs = HashMap::new();
        for (camera_id, rtsp_url) in urls {
            let camera_dir = device_base.join(&camera_id);
            camera_dirs.insert(camera_id.clone(), camera_dir.clone());
            let worker = CameraWorker::new(
                camera_id,
                rtsp_url,
                config.ingest.chunk_seconds,
                camera_dir,
                pause.clone(),
            );
            statuses.push(worker.status_handle());
            workers.push(worker);
        }

        info!(cameras = workers.len(), "ingest supervisor initialized");
        Self {
            config,
            pause,
            statuses,
            camera_dirs,
            workers,
        }
    }

    /// Whether the disk budget currently blocks new segments.
    pub fn paused(&self) -> bool {
        self.pause.load(Ordering::Relaxed)
    }

    pub fn camera_count(&self) -> usize {
        self.statuses.len()
    }

    pub async fn camera_statuses(&self) -> Vec<CameraStatus> {
        let mut statuses = Vec::with_capacity(self.statuses.len());
        for handle in &self.statuses {
            statuses.push(handle.read().await.clone());
        }
        statuses.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        statuses
    }

    /// Start every camera worker plus the disk-budget task. The returned
    /// handles finish once `shutdown` fires.
    pub fn spawn_all(&mut self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();
        for worker in self.workers.drain(..) {
            handles.push(tokio::spawn(worker.run(shutdown.clone())));
        }

        let budget = DiskBudget::new(
            self.config.storage.clip_base.clone(),
            self.config.ingest.chunk_seconds,
            self.config.device.max_disk_usage_percent,
            self.config.device.keep_local_days,
            self.config.ingest.max_local_clips,
            self.pause.clone(),
        );
        handles.push(tokio::spawn(async move { budget.run(shutdown).await }));
        handles
    }

    /// Extract a stitched clip and hand it to the aggregator as a new
    /// event; returns `(clip path, event id)`.
    pub async fn extract_and_submit(
        &self,
        aggregator: &AggregatorClient,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<(PathBuf, String), IngestError> {
        let camera_dir = self
            .camera_dirs
            .get(camera_id)
            .cloned()
            .unwrap_or_else(|| {
                // Unknown cameras still get a deterministic (empty) tree so
                // the error is "no segments", not a config lookup failure.
                self.config
                    .storage
                    .clip_base
                    .join(&self.config.device.tenant_id)
                    .join(&self.config.device.device_id)
                    .join(camera_id)
            });

        let clip_path = clips::extract_clip(
            &self.config.storage.clip_base,
            &camera_dir,
            camera_id,
            from,
            to,
            self.config.ingest.chunk_seconds,
        )
        .await?;

        let submission = EventSubmission {
            camera_id: camera_id.to_string(),
            event_type: "clip_extracted".to_string(),
            timestamp: from,
            local_clip_path: clip_path.display().to_string(),
            objects: vec![],
            dense_caption: None,
            audio_text: None,
            confidence: 1.0,
        };
        let event_id = aggregator.submit_event(&submission).await?;
        Ok((clip_path, event_id))
    }
}
