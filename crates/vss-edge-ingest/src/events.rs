//! Submitting extracted clips back into the delivery pipeline through the
//! aggregator.

use std::time::Duration;

use vss_edge_core::EventSubmission;

use crate::error::IngestError;

const SUBMIT_TIMEOUT_SECS: u64 = 10;

pub struct AggregatorClient {
    client: reqwest::Client,
    base: String,
}

impl AggregatorClient {
    /// Client against the local aggregator service.
    pub fn new(aggregator_port: u16) -> Self {
        Self::with_base(format!("http://localhost:{aggregator_port}"))
    }

    pub fn with_base(base: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// POST a new event; returns the aggregator-assigned event id.
    pub async fn submit_event(&self, submission: &EventSubmission) -> Result<String, IngestError> {
        let response = self
            .client
            .post(format!("{}/events/new", self.base))
            .timeout(Duration::from_secs(SUBMIT_TIMEOUT_SECS))
            .json(submission)
            .send()
            .await
            .map_err(|e| IngestError::AggregatorUnreachable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::AggregatorRejected {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| IngestError::AggregatorRejected {
                    status: status.as_u16(),
                    message: format!("unreadable response: {e}"),
                })?;
        body.get("event_id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| IngestError::AggregatorRejected {
                status: status.as_u16(),
                message: "response missing event_id".to_string(),
            })
    }
}
