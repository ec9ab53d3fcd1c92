//! HTTP client for the package and KB manifest endpoints plus the local CV
//! reload hook.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use vss_edge_core::{EdgeConfig, EdgeError, EdgeResult};

use crate::error::SyncError;

/// One entry of the package listing.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    pub id: String,
    pub version: String,
    pub download_url: String,
    pub sha256: String,
    pub signature: String,
}

/// The KB manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct KbManifest {
    pub kb_version: Option<String>,
    pub delta_package_url: Option<String>,
}

pub struct SyncApiClient {
    client: reqwest::Client,
    packages_url: String,
    kb_manifest_url: String,
    timeout: Duration,
}

impl SyncApiClient {
    pub fn from_config(config: &EdgeConfig) -> EdgeResult<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .map_err(|e| EdgeError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            packages_url: config.api_url(&config.sync.packages_endpoint),
            kb_manifest_url: config.api_url(&config.sync.kb_manifest_endpoint),
            timeout: Duration::from_secs(config.network.api_timeout_seconds),
        })
    }

    /// Packages published since the given model version.
    pub async fn list_packages(&self, since: &str) -> Result<Vec<PackageManifest>, SyncError> {
        let response = self
            .client
            .get(&self.packages_url)
            .timeout(self.timeout)
            .query(&[("since", since)])
            .send()
            .await?;
        let response = check_status(response)?;
        response
            .json::<Vec<PackageManifest>>()
            .await
            .map_err(|e| SyncError::MalformedManifest {
                message: e.to_string(),
            })
    }

    pub async fn kb_manifest(&self) -> Result<KbManifest, SyncError> {
        let response = self
            .client
            .get(&self.kb_manifest_url)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = check_status(response)?;
        response
            .json::<KbManifest>()
            .await
            .map_err(|e| SyncError::MalformedManifest {
                message: e.to_string(),
            })
    }

    /// Stream an artifact to disk. Like the clip PUT, downloads are not
    /// bounded by the API timeout.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), SyncError> {
        debug!(%url, dest = %dest.display(), "downloading artifact");
        let response = self.client.get(url).send().await?;
        let response = check_status(response)?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| SyncError::Transport {
                message: format!("download interrupted: {e}"),
            })?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    /// Ask the CV engine to hot-reload onto a freshly installed version.
    pub async fn notify_reload(
        &self,
        reload_base: &str,
        new_version: &str,
    ) -> Result<(), SyncError> {
        let url = format!("{}/_reload", reload_base.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .query(&[("new_version", new_version)])
            .send()
            .await
            .map_err(|e| SyncError::ReloadFailed {
                message: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(SyncError::ReloadFailed {
                message: format!("reload endpoint returned {}", response.status()),
            });
        }
        Ok(())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SyncError::Server {
            status: status.as_u16(),
            message: status
                .canonical_reason()
                .unwrap_or("unknown status")
                .to_string(),
        })
    }
}
