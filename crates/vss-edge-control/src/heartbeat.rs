//! Heartbeat payload construction from live device state.

use serde::Serialize;

use vss_edge_core::disk::{free_disk_percent, gpu_temp_c};
use vss_edge_core::EdgeConfig;

/// Seconds between heartbeats.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub device_id: String,
    pub device_version: String,
    pub uptime_seconds: u64,
    pub free_disk_percent: Option<f64>,
    pub gpu_temp_c: Option<f64>,
}

/// Sample the device and build one heartbeat payload.
pub fn build_heartbeat(config: &EdgeConfig) -> Heartbeat {
    Heartbeat {
        device_id: config.device.device_id.clone(),
        device_version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime_lib::get().map(|d| d.as_secs()).unwrap_or(0),
        free_disk_percent: free_disk_percent(&config.storage.clip_base),
        gpu_temp_c: gpu_temp_c(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_serializes_expected_fields() {
        let heartbeat = Heartbeat {
            device_id: "thor-mini-001".into(),
            device_version: "0.3.0".into(),
            uptime_seconds: 4_200,
            free_disk_percent: Some(41.5),
            gpu_temp_c: None,
        };

        let json = serde_json::to_value(&heartbeat).unwrap();
        assert_eq!(json["device_id"], "thor-mini-001");
        assert_eq!(json["uptime_seconds"], 4_200);
        assert_eq!(json["free_disk_percent"], 41.5);
        assert!(json["gpu_temp_c"].is_null());
    }
}
