//! HTTP client for the central API's upload protocol.
//!
//! One `reqwest` client per uploader, optionally carrying an mTLS identity
//! from the device's PEM files. The client itself has no default timeout:
//! presign/complete/metadata set the configured `api_timeout_seconds` per
//! request, while the clip PUT is deliberately unbounded (large uploads).

use std::path::Path;
use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::debug;

use vss_edge_core::{EdgeConfig, EdgeError, EdgeResult};

use crate::error::{UploadError, UploadStep};

/// Request body of the presign step.
#[derive(Debug, Serialize)]
pub struct PresignRequest {
    pub tenant_id: String,
    pub device_id: String,
    pub event_id: String,
    pub filename: String,
    pub size_bytes: u64,
    pub content_type: String,
}

/// Response of the presign step. `upload_id` is the optional
/// server-assigned id that replaces the local one for the rest of the
/// transaction.
#[derive(Debug, Deserialize)]
pub struct PresignResponse {
    pub upload_url: Option<String>,
    pub final_url: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
}

/// Content type sent with the clip PUT, inferred from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

pub struct CentralApiClient {
    client: reqwest::Client,
    presigned_url: String,
    complete_url: String,
    metadata_url: String,
    timeout: Duration,
}

impl CentralApiClient {
    /// Build the client from device configuration, wiring mTLS when
    /// requested.
    pub fn from_config(config: &EdgeConfig) -> EdgeResult<Self> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();

        if config.network.use_mtls {
            let certs = &config.network.cert_paths;
            let mut identity_pem = std::fs::read(&certs.client_cert)?;
            identity_pem.extend(std::fs::read(&certs.client_key)?);
            let identity = reqwest::Identity::from_pem(&identity_pem)
                .map_err(|e| EdgeError::Config {
                    message: format!("invalid client certificate material: {e}"),
                })?;
            let ca = reqwest::Certificate::from_pem(&std::fs::read(&certs.ca_cert)?)
                .map_err(|e| EdgeError::Config {
                    message: format!("invalid CA certificate: {e}"),
                })?;
            builder = builder.identity(identity).add_root_certificate(ca);
            debug!("central API client configured with mTLS");
        }

        let client = builder.build().map_err(|e| EdgeError::Config {
            message: format!("failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            presigned_url: config.api_url(&config.upload.presigned_endpoint),
            complete_url: config.api_url(&config.upload.upload_complete_endpoint),
            metadata_url: config.api_url(&config.upload.metadata_endpoint),
            timeout: Duration::from_secs(config.network.api_timeout_seconds),
        })
    }

    /// Step 1: request a presigned upload URL for the clip.
    pub async fn request_presigned(
        &self,
        request: &PresignRequest,
    ) -> Result<PresignResponse, UploadError> {
        let response = self
            .client
            .post(&self.presigned_url)
            .timeout(self.timeout)
            .header("Event-ID", &request.event_id)
            .json(request)
            .send()
            .await
            .map_err(|e| transport(UploadStep::Presign, e))?;
        let response = check_status(UploadStep::Presign, response)?;
        response
            .json::<PresignResponse>()
            .await
            .map_err(|e| UploadError::Transport {
                step: UploadStep::Presign,
                message: format!("invalid presign body: {e}"),
            })
    }

    /// Step 2: stream the clip bytes to object storage. Unbounded: a large
    /// clip on a slow uplink may legitimately take a long time.
    pub async fn put_clip(
        &self,
        upload_url: &str,
        path: &Path,
        size_bytes: u64,
        checksum: &str,
    ) -> Result<(), UploadError> {
        let file = tokio::fs::File::open(path).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));

        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, content_type_for(path))
            .header(CONTENT_LENGTH, size_bytes)
            .header("x-amz-checksum-sha256", checksum)
            .body(body)
            .send()
            .await
            .map_err(|e| transport(UploadStep::Put, e))?;
        check_status(UploadStep::Put, response)?;
        Ok(())
    }

    /// Step 3: notify the central API that the object is in place.
    pub async fn complete_upload(
        &self,
        event_id: &str,
        upload_id: &str,
        final_url: &str,
        checksum: &str,
    ) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.complete_url)
            .timeout(self.timeout)
            .header("Event-ID", event_id)
            .json(&serde_json::json!({
                "upload_id": upload_id,
                "event_id": event_id,
                "final_url": final_url,
                "checksum": checksum,
            }))
            .send()
            .await
            .map_err(|e| transport(UploadStep::Complete, e))?;
        check_status(UploadStep::Complete, response)?;
        Ok(())
    }

    /// Step 4: ship the full event document, augmented with the clip URL.
    pub async fn post_metadata(
        &self,
        event_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), UploadError> {
        let response = self
            .client
            .post(&self.metadata_url)
            .timeout(self.timeout)
            .header("Event-ID", event_id)
            .json(metadata)
            .send()
            .await
            .map_err(|e| transport(UploadStep::Metadata, e))?;
        check_status(UploadStep::Metadata, response)?;
        Ok(())
    }
}

fn transport(step: UploadStep, error: reqwest::Error) -> UploadError {
    UploadError::Transport {
        step,
        message: error.to_string(),
    }
}

fn check_status(
    step: UploadStep,
    response: reqwest::Response,
) -> Result<reqwest::Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(UploadError::Server {
            step,
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("/tmp/clip.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("/tmp/clip.MP4")), "video/mp4");
        assert_eq!(
            content_type_for(Path::new("/tmp/clip.bin")),
            "application/octet-stream"
        );
        assert_eq!(
            content_type_for(Path::new("/tmp/noext")),
            "application/octet-stream"
        );
    }
}
