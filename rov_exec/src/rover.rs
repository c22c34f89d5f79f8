//! # Rover
//!
//! Owns the hardware modules, the map and the shared state, and provides the operations used by
//! the console and the autonomous control loop.
//!
//! Manual commands and the control loop both drive the motors. Every manual command holds the
//! drive lock while it runs and increments the manual command sequence number, so the control
//! loop can detect that a command arrived during its burst and leave the motors alone.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use comms_if::{
    tc::{CmdResponse, CommandParseError, DriveCmd, ModeResponse},
    tm::StatusReport,
};
use log::{info, warn};
use serde_json::Value;
use thiserror::Error;

// Internal
use crate::{
    auto,
    data_store::{Mode, RoverState},
    hal::{Board, Clock},
    motor_ctrl::{self, Manoeuvre, MotorError, Motors},
    occ_grid::{self, FuseReport, OccGridError, OccupancyGrid},
    pin_arbiter::PinArbiter,
    scanner::{self, RangeSample, ScanError, Scanner},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of every module owned by the rover.
#[derive(Debug, Clone)]
pub struct RoverParams {
    pub motor_ctrl: motor_ctrl::Params,
    pub scanner: scanner::Params,
    pub occ_grid: occ_grid::Params,
    pub auto: auto::Params,

    /// Where the map is rendered after every fusion, if anywhere
    pub map_image_path: Option<PathBuf>,

    /// Units: seconds
    pub pin_arbiter_poll_s: f64,
}

pub struct Rover {
    pub(crate) params: RoverParams,
    pub(crate) state: Mutex<RoverState>,

    /// Held for the whole of a manual command, and by the control loop whenever it starts or
    /// stops the motors.
    pub(crate) drive_lock: Mutex<()>,

    pub(crate) arbiter: Arc<PinArbiter>,
    pub(crate) motors: Motors,
    pub(crate) scanner: Mutex<Scanner>,
    pub(crate) grid: Mutex<OccupancyGrid>,
    pub(crate) clock: Arc<dyn Clock>,

    shutdown: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RoverInitError {
    #[error("Invalid pin arbiter poll period: {0} s")]
    InvalidPollPeriod(f64),

    #[error("Invalid autonomy parameters")]
    InvalidAutoParams,

    #[error("Could not initialise the motors: {0}")]
    Motors(#[from] MotorError),

    #[error("Could not initialise the scanner: {0}")]
    Scanner(#[from] ScanError),

    #[error("Could not initialise the occupancy grid: {0}")]
    OccGrid(#[from] OccGridError),
}

/// A command string was not a drive command.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct InvalidCommand(#[from] CommandParseError);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RoverParams {
    fn default() -> Self {
        Self {
            motor_ctrl: motor_ctrl::Params::default(),
            scanner: scanner::Params::default(),
            occ_grid: occ_grid::Params::default(),
            auto: auto::Params::default(),
            map_image_path: None,
            pin_arbiter_poll_s: 0.01,
        }
    }
}

impl Rover {
    /// Build the rover from a board, starting in manual mode with the motors disabled.
    pub fn new(
        board: Board,
        clock: Arc<dyn Clock>,
        params: RoverParams,
    ) -> Result<Self, RoverInitError> {
        if !(params.pin_arbiter_poll_s > 0.0) {
            return Err(RoverInitError::InvalidPollPeriod(params.pin_arbiter_poll_s));
        }
        if !params.auto.are_valid() {
            return Err(RoverInitError::InvalidAutoParams);
        }

        let arbiter = Arc::new(PinArbiter::new(Duration::from_secs_f64(
            params.pin_arbiter_poll_s,
        )));

        let motors = Motors::new(
            board.motors,
            arbiter.clone(),
            clock.clone(),
            params.motor_ctrl.clone(),
        )?;
        let scanner = Scanner::new(
            board.scanner,
            arbiter.clone(),
            clock.clone(),
            params.scanner.clone(),
        )?;
        let grid = OccupancyGrid::new(params.occ_grid.clone())?;

        info!(
            "Rover initialised with a {0}x{0} cell map",
            grid.num_cells()
        );

        Ok(Self {
            state: Mutex::new(RoverState::new(params.motor_ctrl.default_speed_pct)),
            drive_lock: Mutex::new(()),
            arbiter,
            motors,
            scanner: Mutex::new(scanner),
            grid: Mutex::new(grid),
            clock,
            shutdown: AtomicBool::new(false),
            params,
        })
    }

    pub fn params(&self) -> &RoverParams {
        &self.params
    }

    pub fn motors(&self) -> &Motors {
        &self.motors
    }

    pub fn arbiter(&self) -> &PinArbiter {
        &self.arbiter
    }

    /// Snapshot of the rover's state.
    pub fn status(&self) -> StatusReport {
        self.state().to_report()
    }

    /// Parse and execute a manual command.
    ///
    /// Unknown commands are rejected before anything else happens, in particular before any
    /// change of mode.
    pub fn handle_command_str(&self, cmd: &str) -> Result<CmdResponse, InvalidCommand> {
        let cmd: DriveCmd = cmd.parse()?;
        Ok(self.handle_command(cmd))
    }

    /// Execute a manual command.
    ///
    /// Any manual command switches the rover into manual mode. Forward commands are rejected
    /// without touching the hardware while the last scan found the way ahead blocked.
    pub fn handle_command(&self, cmd: DriveCmd) -> CmdResponse {
        let _drive = lock(&self.drive_lock);

        let speed_pct = {
            let mut state = self.state();
            state.manual_cmd_seq = state.manual_cmd_seq.wrapping_add(1);

            if state.auto_enabled() {
                info!("Manual command received, disabling autonomy");
                state.mode = Mode::Manual;
                state.set_status("auto disabled (manual override)");
            }

            if cmd == DriveCmd::Forward && state.forward_blocked {
                warn!("Forward command rejected, obstacle within stopping distance");
                state.last_cmd = String::from("forward(blocked)");
                state.set_status(format!(
                    "blocked: obstacle <= {}cm",
                    self.params.auto.front_stop_cm
                ));
                return CmdResponse::rejected("Forward blocked by obstacle safety");
            }

            state.speed_pct
        };

        let mnvr = match cmd {
            DriveCmd::Forward => Manoeuvre::Forward,
            DriveCmd::Back => Manoeuvre::Back,
            DriveCmd::Left => Manoeuvre::Left,
            DriveCmd::Right => Manoeuvre::Right,
            DriveCmd::Stop => {
                if let Err(e) = self.motors.stop(false) {
                    warn!("Could not coast motors: {}", e);
                }
                self.motors.disable();

                let mut state = self.state();
                state.last_cmd = String::from("stop");
                state.set_status("stopped");
                return CmdResponse::ok();
            }
        };

        if let Err(e) = self.motors.enable() {
            let msg = match e {
                MotorError::PinBusy(_) => {
                    String::from("Motor PWM busy (shared pin held by scanner)")
                }
                e => e.to_string(),
            };
            self.state().set_status(format!("error: {}", msg));
            return CmdResponse::rejected(msg);
        }

        if let Err(e) = self.motors.drive(mnvr, Some(speed_pct as i64)) {
            warn!("Manual {} failed: {}", cmd, e);
            self.state().set_status(format!("error: {}", e));
            return CmdResponse::rejected(e.to_string());
        }

        let mut state = self.state();
        state.last_cmd = cmd.to_string();
        state.set_status(format!("manual: {}", cmd));
        state.pose.note_unmodelled_motion();

        CmdResponse::ok()
    }

    /// Enable or disable the autonomous control loop.
    ///
    /// Disabling also stops and disables the motors.
    pub fn set_auto(&self, enabled: bool) -> ModeResponse {
        if enabled {
            let mut state = self.state();
            state.mode = Mode::Autonomous;
            state.set_status("auto enabled");
            info!("Autonomy enabled");
        } else {
            let _drive = lock(&self.drive_lock);
            {
                let mut state = self.state();
                state.mode = Mode::Manual;
                state.set_status("auto disabled");
            }
            info!("Autonomy disabled");

            if let Err(e) = self.motors.stop(false) {
                warn!("Could not coast motors: {}", e);
            }
            self.motors.disable();
        }

        ModeResponse {
            ok: true,
            auto_enabled: enabled,
        }
    }

    /// Set the drive speed, clamped to 0..=100 %.
    pub fn set_speed(&self, speed_pct: i64) -> Result<u8, MotorError> {
        self.motors.set_speed(speed_pct)?;
        let speed = self.motors.speed_pct();
        self.state().speed_pct = speed;
        Ok(speed)
    }

    /// Store the latest presence data, which is reported unchanged in the status.
    pub fn set_presence(&self, presence: Value) {
        self.state().presence = presence;
    }

    /// Perform one full sweep.
    pub fn scan(&self) -> Result<Vec<RangeSample>, ScanError> {
        lock(&self.scanner).scan()
    }

    /// Fuse a sweep taken at the current pose into the map and render it.
    pub fn fuse(&self, samples: &[RangeSample]) -> Option<FuseReport> {
        let pose = self.state().pose;
        auto::scan_and_fuse(self, &pose, samples)
    }

    /// Render the current map to `path`.
    pub fn render_map<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), OccGridError> {
        let pose = self.state().pose;
        lock(&self.grid).save_render(&pose, path)
    }

    /// Ask the control loop to exit, and leave the motors safe.
    pub fn shutdown(&self) {
        info!("Rover shutting down");
        self.shutdown.store(true, Ordering::SeqCst);

        let _drive = lock(&self.drive_lock);
        self.state().mode = Mode::Manual;
        self.motors.cleanup();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) fn state(&self) -> MutexGuard<RoverState> {
        lock(&self.state)
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::hal::{
        sim::{SimBoard, SimClock, SimPin, SimPwm},
        Level,
    };

    pub(crate) fn sim_rover(range_cm: Option<f64>) -> (Rover, SimBoard) {
        sim_rover_with_clock(range_cm, Arc::new(SimClock::new()))
    }

    pub(crate) fn sim_rover_with_clock(
        range_cm: Option<f64>,
        clock: Arc<dyn Clock>,
    ) -> (Rover, SimBoard) {
        let sim = SimBoard::new(clock.clone());
        sim.set_default_range(range_cm);

        let mut params = RoverParams::default();
        params.motor_ctrl.lease_timeout_s = 0.02;
        params.scanner.lease_timeout_s = 0.02;

        let rover = Rover::new(sim.board(), clock, params).unwrap();
        (rover, sim)
    }

    #[test]
    fn test_manual_drive() {
        let (rover, sim) = sim_rover(None);

        let rsp = rover.handle_command(DriveCmd::Left);
        assert!(rsp.ok);
        assert!(rover.motors().is_enabled());
        assert_eq!(sim.level(SimPin::Stby), Level::High);
        assert_eq!(sim.duty(SimPwm::MotorA), Some(60.0));

        let status = rover.status();
        assert_eq!(status.last_cmd, "left");
        assert_eq!(status.status, "manual: left");
        assert_eq!(status.pose.unmodelled_motions, 1);

        let rsp = rover.handle_command(DriveCmd::Stop);
        assert!(rsp.ok);
        assert!(!rover.motors().is_enabled());
        assert_eq!(sim.level(SimPin::Stby), Level::Low);
        assert!(!sim.pwm_running(SimPwm::MotorA));
        assert_eq!(rover.arbiter().current_owner(), None);
        assert_eq!(rover.status().status, "stopped");
    }

    #[test]
    fn test_blocked_forward() {
        let (rover, sim) = sim_rover(None);
        rover.state().forward_blocked = true;
        sim.clear_events();

        let rsp = rover.handle_command(DriveCmd::Forward);
        assert!(!rsp.ok);
        assert_eq!(
            rsp.error.as_deref(),
            Some("Forward blocked by obstacle safety")
        );
        assert!(sim.events().is_empty());
        assert!(!rover.motors().is_enabled());

        let status = rover.status();
        assert_eq!(status.last_cmd, "forward(blocked)");
        assert_eq!(status.status, "blocked: obstacle <= 30cm");

        // Other directions are still allowed
        assert!(rover.handle_command(DriveCmd::Back).ok);
    }

    #[test]
    fn test_manual_overrides_auto() {
        let (rover, _sim) = sim_rover(None);
        assert!(rover.set_auto(true).auto_enabled);
        assert!(rover.status().auto_enabled);

        rover.handle_command(DriveCmd::Right);
        assert!(!rover.status().auto_enabled);
    }

    #[test]
    fn test_invalid_command() {
        let (rover, sim) = sim_rover(None);
        rover.set_auto(true);
        sim.clear_events();

        assert!(rover.handle_command_str("jump").is_err());
        assert!(rover.status().auto_enabled);
        assert!(sim.events().is_empty());

        assert!(rover.handle_command_str(" LEFT ").unwrap().ok);
    }

    #[test]
    fn test_motors_busy() {
        let (rover, _sim) = sim_rover(None);
        assert!(rover
            .arbiter()
            .acquire(crate::pin_arbiter::PinOwner::Scanner, Duration::from_secs(0)));

        let rsp = rover.handle_command(DriveCmd::Forward);
        assert!(!rsp.ok);
        assert_eq!(
            rsp.error.as_deref(),
            Some("Motor PWM busy (shared pin held by scanner)")
        );
        assert!(!rover.motors().is_enabled());
    }

    #[test]
    fn test_auto_off_disables_motors() {
        let (rover, sim) = sim_rover(None);
        rover.handle_command(DriveCmd::Back);
        rover.set_auto(true);

        let rsp = rover.set_auto(false);
        assert!(rsp.ok);
        assert!(!rsp.auto_enabled);
        assert!(!rover.motors().is_enabled());
        assert_eq!(sim.level(SimPin::Stby), Level::Low);
        assert_eq!(rover.status().status, "auto disabled");
    }

    #[test]
    fn test_speed() {
        let (rover, sim) = sim_rover(None);
        assert_eq!(rover.set_speed(150).unwrap(), 100);
        assert_eq!(rover.set_speed(-3).unwrap(), 0);
        assert_eq!(rover.set_speed(35).unwrap(), 35);
        assert_eq!(rover.status().speed_pct, 35);

        rover.handle_command(DriveCmd::Forward);
        assert_eq!(sim.duty(SimPwm::MotorB), Some(35.0));
    }
}
