//! Semantic validation of the device configuration.
//!
//! Structural typing is serde's job; the rules here are the ones a schema
//! cannot express: global camera-id uniqueness, identity fields that must
//! carry a value, cadence/retry knobs that must not be zero, and
//! certificate paths that must be present when TLS is requested.

use std::collections::HashSet;

use crate::config::{ConfigError, ConfigResult, EdgeConfig};

/// Apply every semantic rule to a structurally valid configuration.
pub fn validate_config(config: &EdgeConfig) -> ConfigResult<()> {
    validate_unique_camera_ids(config)?;
    validate_identity(config)?;
    validate_limits(config)?;
    if config.network.use_mtls || config.network.mqtt_tls {
        validate_cert_paths(config)?;
    }
    Ok(())
}

/// Camera ids are the join key between config, the clip tree and the
/// control plane; a collision anywhere is a load-time error.
fn validate_unique_camera_ids(config: &EdgeConfig) -> ConfigResult<()> {
    let mut seen = HashSet::new();
    for nvr in &config.nvr_list {
        for camera in &nvr.cameras {
            if !seen.insert(camera.id.as_str()) {
                return Err(ConfigError::DuplicateCameraId {
                    camera_id: camera.id.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Tenant and device ids end up in object-store paths, bus topics and
/// server-side idempotency keys; blank values would corrupt all three.
fn validate_identity(config: &EdgeConfig) -> ConfigResult<()> {
    for (value, field) in [
        (&config.device.device_id, "device.device_id"),
        (&config.device.tenant_id, "device.tenant_id"),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "{field} cannot be empty"
            )));
        }
    }
    Ok(())
}

fn validate_limits(config: &EdgeConfig) -> ConfigResult<()> {
    let budget = config.device.max_disk_usage_percent;
    if budget == 0 || budget > 100 {
        return Err(ConfigError::ValidationFailed(format!(
            "device.max_disk_usage_percent must be within 1..=100, got {budget}"
        )));
    }

    // Zero for any of these would spin a poll loop or collapse the
    // backoff schedule.
    let at_least_one: [(u64, &str); 5] = [
        (
            u64::from(config.ingest.chunk_seconds),
            "ingest.chunk_seconds",
        ),
        (
            config.network.api_timeout_seconds,
            "network.api_timeout_seconds",
        ),
        (u64::from(config.upload.max_retries), "upload.max_retries"),
        (
            config.upload.retry_backoff_seconds,
            "upload.retry_backoff_seconds",
        ),
        (
            config.sync.poll_interval_seconds,
            "sync.poll_interval_seconds",
        ),
    ];
    for (value, field) in at_least_one {
        if value == 0 {
            return Err(ConfigError::ValidationFailed(format!(
                "{field} must be at least 1"
            )));
        }
    }
    Ok(())
}

fn validate_cert_paths(config: &EdgeConfig) -> ConfigResult<()> {
    let certs = &config.network.cert_paths;
    for (path, name) in [
        (&certs.client_cert, "network.cert_paths.client_cert"),
        (&certs.client_key, "network.cert_paths.client_key"),
        (&certs.ca_cert, "network.cert_paths.ca_cert"),
    ] {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "{name} is required when TLS is enabled"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::EdgeConfig;

    const BASE: &str = r#"
device:
  device_id: thor-mini-001
  tenant_id: acme
  location: "Warehouse 12"
  keep_local_days: 7
  max_disk_usage_percent: 85
network:
  mqtt_broker: broker.example.com
  mqtt_port: 8883
  mqtt_tls: true
  mqtt_topic_prefix: vss/events
  api_base: https://central.example.com
  api_timeout_seconds: 30
  use_mtls: true
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
  retry_backoff_seconds: 5
sync:
  packages_endpoint: /api/v1/training-packages
  kb_manifest_endpoint: /api/v1/knowledge/manifest
  poll_interval_seconds: 300
"#;

    fn mutated(from: &str, to: &str) -> Result<EdgeConfig, crate::config::ConfigError> {
        EdgeConfig::from_yaml(&BASE.replace(from, to))
    }

    #[test]
    fn base_fixture_is_valid() {
        EdgeConfig::from_yaml(BASE).expect("fixture should validate");
    }

    #[test]
    fn blank_identity_is_rejected() {
        let err = mutated("device_id: thor-mini-001", "device_id: \"  \"").unwrap_err();
        assert!(err.to_string().contains("device.device_id"), "got: {err}");

        let err = mutated("tenant_id: acme", "tenant_id: \"\"").unwrap_err();
        assert!(err.to_string().contains("device.tenant_id"), "got: {err}");
    }

    #[test]
    fn disk_budget_must_be_a_percentage() {
        let err = mutated("max_disk_usage_percent: 85", "max_disk_usage_percent: 0").unwrap_err();
        assert!(err.to_string().contains("max_disk_usage_percent"), "got: {err}");
    }

    #[test]
    fn zero_cadences_are_rejected() {
        let err = mutated("retry_backoff_seconds: 5", "retry_backoff_seconds: 0").unwrap_err();
        assert!(
            err.to_string().contains("upload.retry_backoff_seconds"),
            "got: {err}"
        );

        let err = mutated("poll_interval_seconds: 300", "poll_interval_seconds: 0").unwrap_err();
        assert!(
            err.to_string().contains("sync.poll_interval_seconds"),
            "got: {err}"
        );
    }

    #[test]
    fn tls_requires_every_cert_path() {
        let err = mutated(
            "client_key: /etc/vss/certs/client.key",
            "client_key: \"\"",
        )
        .unwrap_err();
        assert!(
            err.to_string().contains("network.cert_paths.client_key"),
            "got: {err}"
        );
    }

    #[test]
    fn cert_paths_are_ignored_without_tls() {
        let without_tls = BASE
            .replace("mqtt_tls: true", "mqtt_tls: false")
            .replace("use_mtls: true", "use_mtls: false")
            .replace("client_key: /etc/vss/certs/client.key", "client_key: \"\"");
        EdgeConfig::from_yaml(&without_tls).expect("cert paths only matter under TLS");
    }
}
