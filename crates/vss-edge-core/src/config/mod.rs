//! Device configuration for the edge node.
//!
//! The configuration file is YAML with one section per concern (`device`,
//! `network`, `nvr_list`, `ingest`, `upload`, `sync`, plus the optional
//! `storage` and `services` sections that default to the standard on-device
//! layout). Loading is two-pass: serde gives structural typing, then
//! [`validation`] applies the semantic rules (unique camera ids, value
//! ranges, certificate paths).

pub mod error;
pub mod validation;

pub use error::{ConfigError, ConfigResult};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identity and retention settings of the edge device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_id: String,
    pub tenant_id: String,
    pub location: String,
    /// Days to keep local clips before they become eviction candidates.
    pub keep_local_days: u32,
    /// Disk usage on the clip volume above which ingest pauses new segments.
    pub max_disk_usage_percent: u8,
}

/// Client certificate material for mTLS (HTTP and MQTT).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertPaths {
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    pub ca_cert: PathBuf,
}

/// Message-bus and central-API connectivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_tls: bool,
    pub mqtt_topic_prefix: String,
    pub api_base: String,
    pub api_timeout_seconds: u64,
    pub use_mtls: bool,
    pub cert_paths: CertPaths,
}

/// One camera attached to an NVR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Globally unique camera id (across all NVRs).
    pub id: String,
    /// Channel index on the NVR, used by the RTSP template.
    pub index: u32,
    pub label: String,
}

/// One NVR and its attached cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvrConfig {
    pub name: String,
    pub host: String,
    pub onvif_port: u16,
    pub username: String,
    pub password: String,
    /// RTSP URL template with `{username}`, `{password}`, `{host}` and
    /// `{index}` placeholders; the fallback when ONVIF resolution is
    /// unavailable.
    pub camera_rtsp_template: String,
    pub cameras: Vec<CameraConfig>,
}

/// Continuous segmenting parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub chunk_seconds: u32,
    pub max_local_clips: u64,
}

/// Upload protocol endpoints and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub presigned_endpoint: String,
    pub metadata_endpoint: String,
    pub upload_complete_endpoint: String,
    pub max_retries: u32,
    pub retry_backoff_seconds: u64,
}

/// Model/KB synchronization endpoints and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub packages_endpoint: String,
    pub kb_manifest_endpoint: String,
    pub poll_interval_seconds: u64,
}

/// On-disk layout. Optional in the file; defaults to the standard device
/// paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub clip_base: PathBuf,
    pub model_root: PathBuf,
    pub kb_root: PathBuf,
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            clip_base: PathBuf::from("/var/lib/vss/clips"),
            model_root: PathBuf::from("/opt/vss/models"),
            kb_root: PathBuf::from("/opt/vss/kb"),
            db_path: PathBuf::from("/var/lib/vss/vss_events.db"),
        }
    }
}

impl StorageConfig {
    /// Directory for in-flight package downloads, removed on every failure
    /// path.
    pub fn staging_dir(&self) -> PathBuf {
        self.model_root.join(".staging")
    }
}

/// Local HTTP port of each service, used by the watchdog and for
/// inter-service calls. Optional in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicePorts {
    pub ingest: u16,
    pub cv: u16,
    pub aggregator: u16,
    pub watchdog: u16,
    pub uploader: u16,
    pub sync: u16,
    pub control: u16,
}

impl Default for ServicePorts {
    fn default() -> Self {
        Self {
            ingest: 8000,
            cv: 8001,
            aggregator: 8002,
            watchdog: 8003,
            uploader: 8004,
            sync: 8005,
            control: 8006,
        }
    }
}

impl ServicePorts {
    /// The services the watchdog polls, with their ports. The CV engine is
    /// external but exposes the same `/health` convention.
    pub fn watched(&self) -> HashMap<&'static str, u16> {
        HashMap::from([
            ("ingest", self.ingest),
            ("cv", self.cv),
            ("aggregator", self.aggregator),
            ("uploader", self.uploader),
            ("sync", self.sync),
            ("control", self.control),
        ])
    }
}

/// The complete typed device configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub nvr_list: Vec<NvrConfig>,
    pub ingest: IngestConfig,
    pub upload: UploadConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub services: ServicePorts,
}

impl EdgeConfig {
    /// Load and validate the configuration from a YAML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(raw: &str) -> ConfigResult<Self> {
        let config: EdgeConfig =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Join a configured endpoint path onto the API base.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.network.api_base.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}
