//! # Data Store
//!
//! Shared state of the rover, written by the control loop and by manual command handling, and
//! read by status queries. It is always accessed under a single lock, which is never held across
//! a hardware operation.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono::{DateTime, Utc};
use comms_if::tm::StatusReport;
use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::loc::Pose;

// ---------------------------------------------------------------------------
// ENUMS
// ---------------------------------------------------------------------------

/// Operating mode of the rover
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize)]
pub enum Mode {
    Manual,
    Autonomous,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Global state of the rover.
#[derive(Debug, Clone)]
pub struct RoverState {
    /// Human readable description of what the rover is doing
    pub status: String,

    /// Last manual command
    pub last_cmd: String,

    pub mode: Mode,

    /// Speed applied to every manoeuvre
    pub speed_pct: u8,

    // Last scan summary
    /// Closest reading in the forward sector of the last scan, if there was one
    pub front_min_cm: Option<f64>,

    /// True if the way forward was blocked in the last scan
    pub forward_blocked: bool,

    pub last_scan_time: Option<DateTime<Utc>>,

    // Localisation
    pub pose: Pose,

    /// Opaque presence data, reported as given
    pub presence: Value,

    /// Incremented by every manual command, so that the control loop can tell whether someone
    /// else has taken over the motors
    pub manual_cmd_seq: u64,
}

// ---------------------------------------------------------------------------
// IMPLS
// ---------------------------------------------------------------------------

impl RoverState {
    pub fn new(speed_pct: u8) -> Self {
        Self {
            status: String::from("idle"),
            last_cmd: String::from("none"),
            mode: Mode::Manual,
            speed_pct,
            front_min_cm: None,
            forward_blocked: false,
            last_scan_time: None,
            pose: Pose::default(),
            presence: Value::Null,
            manual_cmd_seq: 0,
        }
    }

    pub fn auto_enabled(&self) -> bool {
        self.mode == Mode::Autonomous
    }

    pub fn set_status<S: Into<String>>(&mut self, status: S) {
        let status = status.into();
        if status != self.status {
            debug!("Status: {}", status);
            self.status = status;
        }
    }

    pub fn to_report(&self) -> StatusReport {
        StatusReport {
            status: self.status.clone(),
            last_cmd: self.last_cmd.clone(),
            auto_enabled: self.auto_enabled(),
            speed_pct: self.speed_pct,
            front_min_cm: self.front_min_cm,
            forward_blocked: self.forward_blocked,
            last_scan_time: self.last_scan_time,
            pose: self.pose.to_report(),
            presence: self.presence.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_report() {
        let mut state = RoverState::new(60);
        state.set_status("manual: left");
        state.front_min_cm = Some(42.0);
        state.presence = serde_json::json!({"score": 3});
        state.pose.note_unmodelled_motion();

        let report = state.to_report();
        assert_eq!(report.status, "manual: left");
        assert_eq!(report.last_cmd, "none");
        assert!(!report.auto_enabled);
        assert_eq!(report.speed_pct, 60);
        assert_eq!(report.front_min_cm, Some(42.0));
        assert_eq!(report.presence["score"], 3);
        assert_eq!(report.pose.unmodelled_motions, 1);
    }
}
