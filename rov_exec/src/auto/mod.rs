//! # Autonomy Module
//!
//! The autonomous stop-scan-decide-move loop. Each cycle:
//!
//! 1. stops and disables the motors, handing the shared pin back,
//! 2. sweeps the scanner,
//! 3. decides whether the way forward is blocked,
//! 4. fuses the scan into the occupancy grid and renders the map,
//! 5. and, if the way is clear, drives forward for one short burst and dead-reckons the pose.
//!
//! The motors are never enabled in a cycle whose scan found the way blocked. A manual command
//! arriving at any point cancels the cycle, and the motors are left to the command.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod params;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::Params;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

// Internal
use crate::{
    loc::Pose,
    motor_ctrl::MotorError,
    occ_grid::{FuseReport, OccGridError},
    rover::{lock, Rover},
    scanner::{RangeSample, ScanError},
};

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The phases of an autonomous cycle, reported in the rover status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    StoppingMotors,
    Scanning,
    EvaluatingSafety,
    FusingMap,
    Blocked,
    MovingBurst,
    ErrorBackoff,
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Autonomy was disabled, nothing was done
    Idle,

    /// The way forward was blocked, the rover did not move
    Blocked,

    /// The rover made one forward burst
    Moved,

    /// The motors could not get the shared pin
    MotorsBusy,

    /// Autonomy was disabled or a manual command arrived part way through
    Cancelled,
}

#[derive(Debug, Error)]
pub enum AutoError {
    #[error("Scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Motor error: {0}")]
    Motors(#[from] MotorError),
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Result of checking a scan's forward sector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyAssessment {
    /// Closest reading in the forward sector, if there was any
    pub front_min_cm: Option<f64>,

    pub forward_blocked: bool,
}

/// A scan as archived in the session directory.
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    pub time: DateTime<Utc>,
    pub pose: Pose,
    pub safety: SafetyAssessment,
    pub fuse: Option<FuseReport>,
    pub samples: Vec<RangeSample>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "auto: idle",
            Phase::StoppingMotors => "auto: stopping motors",
            Phase::Scanning => "auto: scanning sonar",
            Phase::EvaluatingSafety => "auto: evaluating safety",
            Phase::FusingMap => "auto: fusing map",
            Phase::Blocked => "auto: blocked by obstacle",
            Phase::MovingBurst => "auto: moving burst",
            Phase::ErrorBackoff => "auto error",
        };
        f.write_str(s)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Find the closest reading in the forward sector and decide whether forward motion is blocked.
///
/// With no readings in the sector the way is considered clear.
pub fn assess_safety(samples: &[RangeSample], params: &Params) -> SafetyAssessment {
    let front_min_cm = samples
        .iter()
        .filter(|s| params.in_forward_sector(s.sweep_angle_deg))
        .map(|s| s.distance_cm)
        .fold(None, |min: Option<f64>, d| match min {
            Some(m) if m <= d => Some(m),
            _ => Some(d),
        });

    SafetyAssessment {
        front_min_cm,
        forward_blocked: matches!(front_min_cm, Some(d) if d <= params.front_stop_cm),
    }
}

/// Run the control loop until the rover is shut down.
///
/// Errors in a cycle are reported in the status and the loop carries on after a backoff.
pub fn run(rover: &Rover) {
    let params = &rover.params.auto;
    info!("Control loop started");

    while !rover.is_shutdown() {
        if !rover.state().auto_enabled() {
            rover.clock.sleep(secs(params.idle_poll_s));
            continue;
        }

        match cycle(rover) {
            Ok(outcome) => debug!("Cycle complete: {:?}", outcome),
            Err(e) => error_backoff(rover, &e),
        }
    }

    info!("Control loop stopped");
}

/// Perform one stop-scan-decide-move cycle.
pub fn cycle(rover: &Rover) -> Result<CycleOutcome, AutoError> {
    let params = &rover.params.auto;

    // ---- STOP ----

    {
        let _drive = lock(&rover.drive_lock);
        if !active(rover) {
            return Ok(CycleOutcome::Idle);
        }
        set_phase(rover, Phase::StoppingMotors);

        // Coasting fails if the motors were never enabled, which is fine
        if let Err(e) = rover.motors.stop(false) {
            debug!("Motors not stopped: {}", e);
        }
        rover.motors.disable();
    }

    rover.clock.sleep(secs(params.pre_scan_settle_s));

    // ---- SCAN ----

    set_phase(rover, Phase::Scanning);
    let samples = match lock(&rover.scanner).scan_until(|| !active(rover)) {
        Ok(s) => s,
        Err(ScanError::Cancelled) => return Ok(CycleOutcome::Cancelled),
        Err(e) => return Err(e.into()),
    };

    // ---- SAFETY ----

    set_phase(rover, Phase::EvaluatingSafety);
    let safety = assess_safety(&samples, params);
    let time = Utc::now();
    let pose = {
        let mut state = rover.state();
        state.front_min_cm = safety.front_min_cm;
        state.forward_blocked = safety.forward_blocked;
        state.last_scan_time = Some(time);
        state.pose
    };

    match safety.front_min_cm {
        Some(d) => debug!(
            "Closest forward reading {:.1} cm, blocked: {}",
            d, safety.forward_blocked
        ),
        None => debug!("No forward readings"),
    }

    // ---- MAP ----

    set_phase(rover, Phase::FusingMap);
    let fuse = scan_and_fuse(rover, &pose, &samples);

    util::session::save_with_timestamp(
        "scans/scan.json",
        ScanRecord {
            time,
            pose,
            safety,
            fuse,
            samples,
        },
    );

    // ---- MOVE ----

    if safety.forward_blocked {
        set_phase(rover, Phase::Blocked);
        rover.clock.sleep(secs(params.blocked_hold_s));
        return Ok(CycleOutcome::Blocked);
    }

    move_burst(rover)
}

/// Drive forward for one burst and dead-reckon the pose.
///
/// The burst is abandoned, and the motors left alone, if a manual command arrives while it is
/// under way.
pub(crate) fn move_burst(rover: &Rover) -> Result<CycleOutcome, AutoError> {
    let params = &rover.params.auto;

    let seq = {
        let _drive = lock(&rover.drive_lock);
        let (seq, speed_pct) = {
            let state = rover.state();
            if rover.is_shutdown() || !state.auto_enabled() {
                return Ok(CycleOutcome::Cancelled);
            }
            (state.manual_cmd_seq, state.speed_pct)
        };

        set_phase(rover, Phase::MovingBurst);

        match rover.motors.enable() {
            Ok(()) => (),
            Err(MotorError::PinBusy(owner)) => {
                warn!("Motors busy, shared pin held by {:?}", owner);
                drop(_drive);
                set_status(rover, "auto: motor PWM busy (shared pin)");
                rover.clock.sleep(secs(params.motors_busy_backoff_s));
                return Ok(CycleOutcome::MotorsBusy);
            }
            Err(e) => return Err(e.into()),
        }

        if let Err(e) = rover.motors.forward(Some(speed_pct as i64)) {
            rover.motors.cleanup();
            return Err(e.into());
        }

        seq
    };

    rover.clock.sleep(secs(params.move_burst_s));

    let _drive = lock(&rover.drive_lock);

    if rover.state().manual_cmd_seq != seq {
        debug!("Manual command during burst, leaving the motors alone");
        return Ok(CycleOutcome::Cancelled);
    }

    if let Err(e) = rover.motors.stop(false) {
        warn!("Could not coast motors after burst: {}", e);
    }
    rover.motors.disable();

    let mut state = rover.state();
    if !state.auto_enabled() || rover.is_shutdown() {
        return Ok(CycleOutcome::Cancelled);
    }

    state.pose.advance(params.step_cm);
    state.set_status(Phase::Idle.to_string());

    Ok(CycleOutcome::Moved)
}

/// Fuse a scan taken at `pose` into the map and render it.
///
/// Neither failing to fuse nor failing to render stops the cycle.
pub fn scan_and_fuse(rover: &Rover, pose: &Pose, samples: &[RangeSample]) -> Option<FuseReport> {
    let points: Vec<_> = samples.iter().map(|s| s.local_point()).collect();
    let mut grid = lock(&rover.grid);

    let report = match grid.update_with_scan(pose, &points) {
        Ok(r) => {
            debug!("Fused scan: {:?}", r);
            Some(r)
        }
        Err(OccGridError::PoseOutsideMap(x, y)) => {
            warn!("Rover at ({:.1}, {:.1}) cm is outside the map, scan not fused", x, y);
            None
        }
        Err(e) => {
            warn!("Could not fuse scan: {}", e);
            None
        }
    };

    if let Some(path) = &rover.params.map_image_path {
        if let Err(e) = grid.save_render(pose, path) {
            warn!("Could not render map to {:?}: {}", path, e);
        }
    }

    report
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Report a failed cycle and wait before the next one.
fn error_backoff(rover: &Rover, e: &AutoError) {
    error!("Autonomous cycle failed: {}", e);
    set_status(rover, format!("{}: {}", Phase::ErrorBackoff, e));
    rover.clock.sleep(secs(rover.params.auto.error_backoff_s));
}

fn active(rover: &Rover) -> bool {
    !rover.is_shutdown() && rover.state().auto_enabled()
}

/// Report the phase, unless autonomy has been switched off meanwhile.
fn set_phase(rover: &Rover, phase: Phase) {
    set_status(rover, phase.to_string());
}

fn set_status<S: Into<String>>(rover: &Rover, status: S) {
    let mut state = rover.state();
    if state.auto_enabled() {
        state.set_status(status);
    }
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
