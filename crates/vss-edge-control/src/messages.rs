//! Bus topics and control-message payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `vss/heartbeat/{device_id}`: periodic device heartbeat.
pub fn heartbeat_topic(device_id: &str) -> String {
    format!("vss/heartbeat/{device_id}")
}

/// `vss/control/{device_id}`: commands addressed to this device.
pub fn control_topic(device_id: &str) -> String {
    format!("vss/control/{device_id}")
}

/// `{prefix}/{tenant}/{camera}`: event summaries.
pub fn event_topic(prefix: &str, tenant_id: &str, camera_id: &str) -> String {
    format!("{prefix}/{tenant_id}/{camera_id}")
}

/// Commands accepted on the control topic.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    RequestClip {
        camera_id: String,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        request_id: String,
    },
    #[serde(other)]
    Unknown,
}

/// Summary published after a control command produced a new event.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub event_id: String,
    pub camera_id: String,
    pub event_type: String,
    pub request_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn topics_embed_identity() {
        assert_eq!(heartbeat_topic("thor-mini-001"), "vss/heartbeat/thor-mini-001");
        assert_eq!(control_topic("thor-mini-001"), "vss/control/thor-mini-001");
        assert_eq!(
            event_topic("vss/events", "acme", "cam-01"),
            "vss/events/acme/cam-01"
        );
    }

    #[test]
    fn request_clip_parses() {
        let raw = r#"{
            "action": "request_clip",
            "camera_id": "cam-01",
            "from": "2025-11-16T10:00:00Z",
            "to": "2025-11-16T10:01:00Z",
            "request_id": "req-42"
        }"#;
        let message: ControlMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(
            message,
            ControlMessage::RequestClip {
                camera_id: "cam-01".into(),
                from: Utc.with_ymd_and_hms(2025, 11, 16, 10, 0, 0).unwrap(),
                to: Utc.with_ymd_and_hms(2025, 11, 16, 10, 1, 0).unwrap(),
                request_id: "req-42".into(),
            }
        );
    }

    #[test]
    fn unknown_actions_do_not_fail_parsing() {
        let message: ControlMessage =
            serde_json::from_str(r#"{"action": "reboot_device"}"#).unwrap();
        assert_eq!(message, ControlMessage::Unknown);
    }

    #[test]
    fn request_clip_with_missing_fields_is_an_error() {
        let raw = r#"{"action": "request_clip", "camera_id": "cam-01"}"#;
        assert!(serde_json::from_str::<ControlMessage>(raw).is_err());
    }
}
