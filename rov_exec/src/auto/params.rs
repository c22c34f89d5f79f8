//! # Autonomy Parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the autonomous control loop
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Params {
    // ---- SAFETY ----
    /// Lowest servo angle of the forward sector.
    ///
    /// Units: degrees
    pub forward_sector_min_deg: f64,

    /// Highest servo angle of the forward sector.
    ///
    /// Units: degrees
    pub forward_sector_max_deg: f64,

    /// Forward motion is blocked if anything in the forward sector is at or within this range.
    ///
    /// Units: centimeters
    pub front_stop_cm: f64,

    // ---- MOTION ----
    /// Duration of one forward burst.
    ///
    /// Units: seconds
    pub move_burst_s: f64,

    /// Distance the rover is assumed to travel in one burst.
    ///
    /// Units: centimeters
    pub step_cm: f64,

    // ---- TIMING ----
    /// Units: seconds
    pub pre_scan_settle_s: f64,

    /// Time spent waiting after finding the way forward blocked.
    ///
    /// Units: seconds
    pub blocked_hold_s: f64,

    /// Time spent waiting after failing to get the motors.
    ///
    /// Units: seconds
    pub motors_busy_backoff_s: f64,

    /// Time spent waiting after a failed cycle.
    ///
    /// Units: seconds
    pub error_backoff_s: f64,

    /// Polling period while autonomy is disabled.
    ///
    /// Units: seconds
    pub idle_poll_s: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            forward_sector_min_deg: 80.0,
            forward_sector_max_deg: 100.0,
            front_stop_cm: 30.0,
            move_burst_s: 0.2,
            step_cm: 6.0,
            pre_scan_settle_s: 0.05,
            blocked_hold_s: 0.2,
            motors_busy_backoff_s: 0.2,
            error_backoff_s: 0.5,
            idle_poll_s: 0.1,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> bool {
        self.forward_sector_min_deg <= self.forward_sector_max_deg
            && self.front_stop_cm >= 0.0
            && self.move_burst_s >= 0.0
            && self.step_cm >= 0.0
            && [
                self.pre_scan_settle_s,
                self.blocked_hold_s,
                self.motors_busy_backoff_s,
                self.error_backoff_s,
            ]
            .iter()
            .all(|t| *t >= 0.0)
            && self.idle_poll_s > 0.0
    }

    /// True if the servo angle lies in the forward sector.
    pub fn in_forward_sector(&self, sweep_angle_deg: f64) -> bool {
        sweep_angle_deg >= self.forward_sector_min_deg
            && sweep_angle_deg <= self.forward_sector_max_deg
    }
}
