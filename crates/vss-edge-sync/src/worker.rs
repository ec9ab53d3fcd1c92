//! The sync worker loop: poll packages, poll the KB manifest, keep the
//! model directory and the store consistent.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task;
use tracing::{error, info, warn};

use vss_edge_core::{EdgeConfig, EdgeResult};
use vss_edge_store::Store;

use crate::client::{PackageManifest, SyncApiClient};
use crate::error::SyncError;
use crate::installer::{extract_archive, ModelInstaller};
use crate::verify::{verify_sha256, PackageVerifier};

/// Key of the model version entry in the device's version map; the
/// packages poll sends it as `since`.
pub const MODEL_SERVICE: &str = "model";

fn log_sync_failure(context: &str, error: &SyncError) {
    if error.is_retryable() {
        warn!("{context} failed, retrying next tick: {error}");
    } else {
        error!("{context} failed: {error}");
    }
}

/// Model version reported before any package has been installed.
const INITIAL_MODEL_VERSION: &str = "0.0.0";

pub struct SyncWorker {
    config: Arc<EdgeConfig>,
    store: Store,
    client: SyncApiClient,
    verifier: PackageVerifier,
    installer: ModelInstaller,
    staging_dir: PathBuf,
    kb_root: PathBuf,
    reload_base: String,
}

impl SyncWorker {
    pub fn new(
        config: Arc<EdgeConfig>,
        store: Store,
        verifier: PackageVerifier,
    ) -> EdgeResult<Self> {
        let client = SyncApiClient::from_config(&config)?;
        let storage = &config.storage;
        let installer = ModelInstaller::new(storage.model_root.clone(), storage.staging_dir());
        let reload_base = format!("http://localhost:{}", config.services.cv);
        Ok(Self {
            staging_dir: storage.staging_dir(),
            kb_root: storage.kb_root.clone(),
            config,
            store,
            client,
            verifier,
            installer,
            reload_base,
        })
    }

    /// Override where the CV reload hook lives (tests, non-local CV).
    pub fn reload_base(mut self, base: String) -> Self {
        self.reload_base = base;
        self
    }

    /// Periodic loop until shutdown. `force` triggers an immediate tick
    /// (the `POST /sync/force` endpoint holds the sender).
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
        mut force: mpsc::Receiver<()>,
    ) -> EdgeResult<()> {
        info!(
            poll_interval = self.config.sync.poll_interval_seconds,
            "sync worker started"
        );
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.sync.poll_interval_seconds));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                Some(()) = force.recv() => {
                    info!("forced sync requested");
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("sync worker stopping");
                    return Ok(());
                }
            }
        }
    }

    /// One full synchronization pass. Failures are logged per package and
    /// never propagate from one package (or from packages to KB).
    pub async fn tick(&self) {
        if let Err(e) = self.sync_packages().await {
            log_sync_failure("package sync", &e);
        }
        if let Err(e) = self.sync_kb().await {
            log_sync_failure("kb sync", &e);
        }
    }

    async fn sync_packages(&self) -> Result<(), SyncError> {
        let store = self.store.clone();
        let device_id = self.config.device.device_id.clone();
        let since = task::spawn_blocking(move || store.service_version(&device_id, MODEL_SERVICE))
            .await
            .map_err(|e| SyncError::Transport {
                message: format!("blocking pool failed: {e}"),
            })??
            .unwrap_or_else(|| INITIAL_MODEL_VERSION.to_string());

        let packages = self.client.list_packages(&since).await?;
        if packages.is_empty() {
            return Ok(());
        }
        info!(count = packages.len(), %since, "packages available");

        // Sequential installs keep model-directory mutation serializable.
        for package in packages {
            if let Err(e) = self.process_package(&package).await {
                if e.is_retryable() {
                    warn!(
                        package = %package.id,
                        version = %package.version,
                        "package install failed, retrying next tick: {e}"
                    );
                } else {
                    error!(
                        package = %package.id,
                        version = %package.version,
                        "package install failed: {e}"
                    );
                }
            }
        }
        Ok(())
    }

    /// Download, verify, install and hot-reload one package. The staging
    /// archive is removed on every path out of this function.
    async fn process_package(&self, package: &PackageManifest) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staging_file = self
            .staging_dir
            .join(format!("{}-{}.tar.gz", package.id, package.version));

        let result = self.install_package(package, &staging_file).await;
        if staging_file.exists() {
            let _ = tokio::fs::remove_file(&staging_file).await;
        }
        result
    }

    async fn install_package(
        &self,
        package: &PackageManifest,
        staging_file: &std::path::Path,
    ) -> Result<(), SyncError> {
        info!(package = %package.id, version = %package.version, "processing package");
        self.client
            .download(&package.download_url, staging_file)
            .await?;

        let artifact = format!("{}-{}", package.id, package.version);
        {
            let artifact = artifact.clone();
            let path = staging_file.to_path_buf();
            let expected = package.sha256.clone();
            task::spawn_blocking(move || verify_sha256(&artifact, &path, &expected))
                .await
                .map_err(|e| SyncError::Transport {
                    message: format!("blocking pool failed: {e}"),
                })??;
        }

        let archive_bytes = tokio::fs::read(staging_file).await?;
        self.verifier
            .verify(&artifact, &archive_bytes, &package.signature)?;

        let installation = {
            let installer_archive = staging_file.to_path_buf();
            let package_id = package.id.clone();
            let installer = self.installer.clone();
            task::spawn_blocking(move || installer.install(&package_id, &installer_archive))
                .await
                .map_err(|e| SyncError::Transport {
                    message: format!("blocking pool failed: {e}"),
                })??
        };

        if let Err(e) = self
            .client
            .notify_reload(&self.reload_base, &package.version)
            .await
        {
            warn!(package = %package.id, "reload failed, rolling back install");
            if let Err(rollback_err) = installation.rollback() {
                error!(package = %package.id, "rollback failed: {rollback_err}");
            }
            return Err(e);
        }
        installation.commit()?;

        let store = self.store.clone();
        let device_id = self.config.device.device_id.clone();
        let version = package.version.clone();
        task::spawn_blocking(move || {
            store.record_service_version(&device_id, MODEL_SERVICE, &version)
        })
        .await
        .map_err(|e| SyncError::Transport {
            message: format!("blocking pool failed: {e}"),
        })??;

        info!(package = %package.id, version = %package.version, "package install complete");
        Ok(())
    }

    async fn sync_kb(&self) -> Result<(), SyncError> {
        let manifest = self.client.kb_manifest().await?;
        let (Some(new_version), Some(delta_url)) =
            (manifest.kb_version, manifest.delta_package_url)
        else {
            return Ok(());
        };

        let store = self.store.clone();
        let current = task::spawn_blocking(move || store.current_kb_version())
            .await
            .map_err(|e| SyncError::Transport {
                message: format!("blocking pool failed: {e}"),
            })??;
        if new_version == current {
            return Ok(());
        }
        info!(%current, %new_version, "new kb version available");

        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let staging_file = self.staging_dir.join(format!("kb-{new_version}.tar.gz"));
        let result = self.apply_kb_delta(&new_version, &delta_url, &staging_file).await;
        if staging_file.exists() {
            let _ = tokio::fs::remove_file(&staging_file).await;
        }
        result
    }

    async fn apply_kb_delta(
        &self,
        version: &str,
        delta_url: &str,
        staging_file: &std::path::Path,
    ) -> Result<(), SyncError> {
        self.client.download(delta_url, staging_file).await?;

        let dest = self.kb_root.join(version);
        {
            let archive = staging_file.to_path_buf();
            let dest = dest.clone();
            task::spawn_blocking(move || extract_archive(&archive, &dest))
                .await
                .map_err(|e| SyncError::Transport {
                    message: format!("blocking pool failed: {e}"),
                })??;
        }

        let store = self.store.clone();
        let version_owned = version.to_string();
        task::spawn_blocking(move || store.record_kb_version(&version_owned))
            .await
            .map_err(|e| SyncError::Transport {
                message: format!("blocking pool failed: {e}"),
            })??;

        info!(%version, "kb delta applied");
        Ok(())
    }
}
