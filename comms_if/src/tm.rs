//! # Telemetry module
//!
//! The status report returned by the rover's status query.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Snapshot of the rover state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Human readable status string
    pub status: String,

    /// The last command issued to the motors, e.g. `forward` or `forward(blocked)`
    pub last_cmd: String,

    pub auto_enabled: bool,

    pub speed_pct: u8,

    /// Minimum distance seen in the forward sector by the latest scan, `None` if the latest scan
    /// had no samples in the sector.
    pub front_min_cm: Option<f64>,

    pub forward_blocked: bool,

    pub last_scan_time: Option<DateTime<Utc>>,

    pub pose: PoseReport,

    /// Presence data passed through unmodified from the presence scanner.
    pub presence: Value,
}

/// Dead-reckoned pose of the rover in the map frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseReport {
    pub x_cm: f64,
    pub y_cm: f64,
    pub theta_deg: f64,

    /// Number of motions performed which the dead reckoning does not model. The larger this is the
    /// less the pose should be trusted.
    pub unmodelled_motions: u32,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_presence_passthrough() {
        let presence = serde_json::json!({"score": 42, "top": [{"bssid": "aa:bb"}]});

        let report = StatusReport {
            status: "idle".into(),
            last_cmd: "none".into(),
            auto_enabled: false,
            speed_pct: 60,
            front_min_cm: None,
            forward_blocked: false,
            last_scan_time: None,
            pose: PoseReport { x_cm: 0.0, y_cm: 6.0, theta_deg: 0.0, unmodelled_motions: 0 },
            presence: presence.clone(),
        };

        let json: Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["presence"], presence);
        assert_eq!(json["front_min_cm"], Value::Null);
        assert_eq!(json["pose"]["y_cm"], 6.0);
    }
}
