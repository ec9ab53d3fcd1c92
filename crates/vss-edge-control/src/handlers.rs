//! Dispatching control commands to the local services.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::info;

use crate::error::ControlError;

const DISPATCH_TIMEOUT_SECS: u64 = 120;

/// Outcome of a clip request handed to the ingest service.
#[derive(Debug, Clone)]
pub struct ClipOutcome {
    pub clip_path: String,
    pub event_id: String,
}

pub struct ClipDispatcher {
    client: reqwest::Client,
    ingest_base: String,
}

impl ClipDispatcher {
    pub fn new(ingest_port: u16) -> Self {
        Self::with_base(format!("http://localhost:{ingest_port}"))
    }

    pub fn with_base(base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            ingest_base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Ask the ingest service to extract (and enqueue) a clip. Extraction
    /// stitches real files, so the timeout is generous.
    pub async fn dispatch(
        &self,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        request_id: &str,
    ) -> Result<ClipOutcome, ControlError> {
        info!(camera_id, request_id, "dispatching clip request to ingest");
        let response = self
            .client
            .post(format!("{}/clips/extract", self.ingest_base))
            .timeout(Duration::from_secs(DISPATCH_TIMEOUT_SECS))
            .json(&json!({
                "camera_id": camera_id,
                "from": from,
                "to": to,
                "request_id": request_id,
            }))
            .send()
            .await
            .map_err(|e| ControlError::ClipDispatchFailed {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::ClipRejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ControlError::ClipDispatchFailed {
                    message: format!("unreadable response: {e}"),
                })?;

        let clip_path = body
            .get("clip_path")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let event_id = body
            .get("event_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(ClipOutcome {
            clip_path,
            event_id,
        })
    }
}
