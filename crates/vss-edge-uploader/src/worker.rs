//! The upload state machine.
//!
//! ```text
//!        PENDING_UPLOAD ◄──────── retry (5xx/transport, attempts < max)
//!              │ lease (per-row compare-and-set)
//!              ▼
//!          PROCESSING ── presign ── PUT ── complete ── metadata
//!              │                                         │
//!          failure                                    success
//!              ▼                                         ▼
//!        FAILED (4xx, attempt cap,                    UPLOADED
//!                missing file)
//! ```
//!
//! Up to [`MAX_CONCURRENT_UPLOADS`] transactions run at once; the retry
//! sleep happens inside the owning worker slot, then the row flips back to
//! `PENDING_UPLOAD` for a later poll to pick up.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task;
use tracing::{debug, error, info, warn};

use vss_edge_core::checksum::sha256_file;
use vss_edge_core::retry::{backoff_delay, BACKOFF_CAP_SECONDS};
use vss_edge_core::{EdgeConfig, EdgeError, EdgeResult};
use vss_edge_store::{
    PendingUpload, Store, UploadFields, UploadStatus, STALE_PROCESSING_THRESHOLD_SECS,
};

use crate::client::{content_type_for, CentralApiClient, PresignRequest};
use crate::error::UploadError;

/// Seconds between queue polls when idle.
pub const POLL_INTERVAL_SECS: u64 = 5;

/// Rows fetched per poll.
pub const BATCH_LIMIT: i64 = 10;

/// Upload transactions in flight at once.
pub const MAX_CONCURRENT_UPLOADS: usize = 4;

pub struct Uploader {
    config: Arc<EdgeConfig>,
    store: Store,
    client: CentralApiClient,
}

impl Uploader {
    pub fn new(config: Arc<EdgeConfig>, store: Store) -> EdgeResult<Self> {
        let client = CentralApiClient::from_config(&config)?;
        Ok(Self {
            config,
            store,
            client,
        })
    }

    /// Poll-and-process loop until shutdown. Reclaims rows abandoned in
    /// `PROCESSING` by a previous run before the first poll.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> EdgeResult<()> {
        let store = self.store.clone();
        task::spawn_blocking(move || {
            store.reset_stalled_uploads(Duration::from_secs(STALE_PROCESSING_THRESHOLD_SECS))
        })
        .await
        .map_err(|e| EdgeError::Fatal {
            message: format!("blocking pool failed: {e}"),
        })??;

        info!(
            poll_interval = POLL_INTERVAL_SECS,
            workers = MAX_CONCURRENT_UPLOADS,
            "uploader service started"
        );

        let mut ticker = tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.step().await {
                        warn!("uploader step failed: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    info!("uploader loop stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One poll: fetch a batch of pending rows and run their transactions
    /// concurrently. Returns how many rows were picked up.
    pub async fn step(&self) -> EdgeResult<usize> {
        let store = self.store.clone();
        let pending = task::spawn_blocking(move || store.list_pending_uploads(BATCH_LIMIT))
            .await
            .map_err(|e| EdgeError::Fatal {
                message: format!("blocking pool failed: {e}"),
            })??;

        if pending.is_empty() {
            debug!("no pending uploads");
            return Ok(0);
        }

        let count = pending.len();
        info!(count, "processing pending uploads");

        futures_util::stream::iter(pending)
            .for_each_concurrent(MAX_CONCURRENT_UPLOADS, |upload| async move {
                self.process_upload(upload).await;
            })
            .await;

        Ok(count)
    }

    /// Full lifecycle of one row: lease, transaction, terminal transition
    /// or retry. A failure here never propagates to other rows.
    pub async fn process_upload(&self, upload: PendingUpload) {
        let store = self.store.clone();
        let upload_id = upload.upload_id.clone();
        let claimed = match task::spawn_blocking(move || store.claim_upload(&upload_id)).await {
            Ok(Ok(claimed)) => claimed,
            Ok(Err(e)) => {
                error!(upload_id = %upload.upload_id, "lease failed: {e}");
                return;
            }
            Err(e) => {
                error!(upload_id = %upload.upload_id, "blocking pool failed: {e}");
                return;
            }
        };
        if !claimed {
            debug!(upload_id = %upload.upload_id, "row already owned by another worker");
            return;
        }

        let mut upload = upload;
        match self.run_transaction(&mut upload).await {
            Ok(final_url) => {
                let store = self.store.clone();
                let upload_id = upload.upload_id.clone();
                let event_id = upload.event_id.clone();
                let url = final_url.clone();
                let result = task::spawn_blocking(move || {
                    store.update_upload(
                        &upload_id,
                        UploadStatus::Uploaded,
                        UploadFields {
                            final_url: Some(url),
                            ..UploadFields::default()
                        },
                    )
                })
                .await;
                match result {
                    Ok(Ok(())) => {
                        info!(
                            upload_id = %upload.upload_id,
                            %event_id,
                            %final_url,
                            "upload transaction complete"
                        );
                    }
                    Ok(Err(e)) => error!(upload_id = %upload.upload_id, "final update failed: {e}"),
                    Err(e) => error!(upload_id = %upload.upload_id, "blocking pool failed: {e}"),
                }
            }
            Err(e) => self.handle_failure(&upload, e).await,
        }
    }

    /// The four ordered HTTP steps, with checksum and id bookkeeping.
    async fn run_transaction(&self, upload: &mut PendingUpload) -> Result<String, UploadError> {
        let path = Path::new(&upload.filepath).to_path_buf();
        if !path.exists() {
            return Err(UploadError::MissingFile {
                path: upload.filepath.clone(),
            });
        }

        let checksum_path = path.clone();
        let checksum = task::spawn_blocking(move || sha256_file(&checksum_path))
            .await
            .map_err(|e| UploadError::Transport {
                step: crate::UploadStep::Presign,
                message: format!("blocking pool failed: {e}"),
            })??;
        let size_bytes = tokio::fs::metadata(&path).await?.len();

        let attempt = upload.attempts + 1;
        debug!(
            upload_id = %upload.upload_id,
            event_id = %upload.event_id,
            attempt,
            "step presign: requesting upload url"
        );
        let presign = self
            .client
            .request_presigned(&PresignRequest {
                tenant_id: self.config.device.tenant_id.clone(),
                device_id: self.config.device.device_id.clone(),
                event_id: upload.event_id.clone(),
                filename: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| upload.filepath.clone()),
                size_bytes,
                content_type: content_type_for(&path).to_string(),
            })
            .await?;

        let upload_url = presign.upload_url.ok_or(UploadError::MalformedResponse {
            field: "upload_url",
        })?;
        let final_url = presign.final_url.ok_or(UploadError::MalformedResponse {
            field: "final_url",
        })?;

        // A server-assigned id replaces the local one for every subsequent
        // step, persisted atomically with the checksum under the lease.
        let effective_id = presign
            .upload_id
            .unwrap_or_else(|| upload.upload_id.clone());
        {
            let store = self.store.clone();
            let local_id = upload.upload_id.clone();
            let server_id = effective_id.clone();
            let sum = checksum.clone();
            task::spawn_blocking(move || store.replace_upload_id(&local_id, &server_id, &sum))
                .await
                .map_err(|e| UploadError::Transport {
                    step: crate::UploadStep::Presign,
                    message: format!("blocking pool failed: {e}"),
                })??;
        }
        upload.upload_id = effective_id;
        upload.checksum = Some(checksum.clone());
        info!(
            upload_id = %upload.upload_id,
            event_id = %upload.event_id,
            attempt,
            "step presign: ok"
        );

        self.client
            .put_clip(&upload_url, &path, size_bytes, &checksum)
            .await?;
        info!(
            upload_id = %upload.upload_id,
            event_id = %upload.event_id,
            attempt,
            size_bytes,
            "step put: clip uploaded"
        );

        self.client
            .complete_upload(&upload.event_id, &upload.upload_id, &final_url, &checksum)
            .await?;
        info!(
            upload_id = %upload.upload_id,
            event_id = %upload.event_id,
            attempt,
            "step complete: ok"
        );

        let store = self.store.clone();
        let event_id = upload.event_id.clone();
        let stored = task::spawn_blocking(move || store.get_event(&event_id))
            .await
            .map_err(|e| UploadError::Transport {
                step: crate::UploadStep::Metadata,
                message: format!("blocking pool failed: {e}"),
            })??
            .ok_or_else(|| UploadError::EventNotFound {
                event_id: upload.event_id.clone(),
            })?;

        let mut metadata = serde_json::to_value(&stored.document)?;
        metadata["clip_url"] = serde_json::Value::String(final_url.clone());
        metadata["upload_id"] = serde_json::Value::String(upload.upload_id.clone());
        self.client.post_metadata(&upload.event_id, &metadata).await?;
        info!(
            upload_id = %upload.upload_id,
            event_id = %upload.event_id,
            attempt,
            "step metadata: ok"
        );

        Ok(final_url)
    }

    /// Failure classification per the retry policy: a missing file is
    /// terminal without counting an attempt; transport/5xx failures back
    /// off and requeue until the attempt cap; everything else is terminal.
    async fn handle_failure(&self, upload: &PendingUpload, error: UploadError) {
        if matches!(error, UploadError::MissingFile { .. }) {
            error!(
                upload_id = %upload.upload_id,
                event_id = %upload.event_id,
                "{error}; marking FAILED"
            );
            self.finish(upload, UploadStatus::Failed, None).await;
            return;
        }

        let attempts = upload.attempts + 1;
        let max_retries = self.config.upload.max_retries;
        let status_code = error.status_code();

        if attempts >= max_retries {
            error!(
                upload_id = %upload.upload_id,
                event_id = %upload.event_id,
                attempts,
                "upload failed after {attempts} attempts: {error}; marking FAILED"
            );
            self.finish(upload, UploadStatus::Failed, Some(attempts)).await;
            return;
        }

        if error.is_retryable() {
            let delay = backoff_delay(
                self.config.upload.retry_backoff_seconds,
                attempts,
                BACKOFF_CAP_SECONDS,
            );
            warn!(
                upload_id = %upload.upload_id,
                event_id = %upload.event_id,
                status_code,
                attempt = attempts,
                max_retries,
                delay_secs = delay.as_secs_f64(),
                "transient failure, backing off before requeue: {error}"
            );
            tokio::time::sleep(delay).await;
            self.finish(upload, UploadStatus::PendingUpload, Some(attempts))
                .await;
        } else {
            error!(
                upload_id = %upload.upload_id,
                event_id = %upload.event_id,
                status_code,
                "permanent failure: {error}; marking FAILED"
            );
            self.finish(upload, UploadStatus::Failed, Some(attempts)).await;
        }
    }

    async fn finish(&self, upload: &PendingUpload, status: UploadStatus, attempts: Option<u32>) {
        let store = self.store.clone();
        let upload_id = upload.upload_id.clone();
        let result = task::spawn_blocking(move || {
            store.update_upload(
                &upload_id,
                status,
                UploadFields {
                    attempts: attempts.map(|a| a as i32),
                    ..UploadFields::default()
                },
            )
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(upload_id = %upload.upload_id, "status update failed: {e}"),
            Err(e) => error!(upload_id = %upload.upload_id, "blocking pool failed: {e}"),
        }
    }
}
