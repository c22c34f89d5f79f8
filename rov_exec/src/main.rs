//! Main rover-side executable entry point.
//!
//! # Architecture
//!
//! The executable:
//!
//!     - Initialises the session, logging and parameters
//!     - Opens the hardware, either the Pi's GPIO or a simulated board
//!     - Builds the rover and renders the initial (empty) map
//!     - Then either:
//!         - runs one of the hardware test routines and exits, or
//!         - starts the autonomous control loop in a background thread and reads commands from
//!           the console until told to quit.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{debug, error, info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::{path::PathBuf, sync::Arc, thread, time::Duration};
use structopt::StructOpt;

// Internal
use comms_if::tc::Tc;
use rov_lib::{
    auto,
    hal::{sim::SimBoard, Board, Clock, SystemClock},
    motor_ctrl, occ_grid,
    params::RovExecParams,
    rover::{Rover, RoverParams},
    scanner,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const PROMPT: &str = "rover $ ";

/// Duration of each manoeuvre in the motor test.
const MOTOR_TEST_MNVR_S: f64 = 0.5;

/// Pause between manoeuvres in the motor test.
const MOTOR_TEST_PAUSE_S: f64 = 0.2;

/// Number of samples printed by the sonar test.
const SONAR_TEST_NUM_PRINTED: usize = 15;

/// Distance to the wall ahead of the simulated rover.
const SIM_WALL_CM: f64 = 150.0;

// ---------------------------------------------------------------------------
// STRUCTS
// ---------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "rov_exec", about = "Rover executable")]
struct Opts {
    /// Run the motor test routine and exit
    #[structopt(long)]
    motor_test: bool,

    /// Run one sonar sweep, print it and exit
    #[structopt(long)]
    sonar_test: bool,

    /// Use a simulated board instead of the GPIO
    #[structopt(long)]
    sim: bool,

    /// Minimum log level (info, debug or trace)
    #[structopt(long, default_value = "debug")]
    log_level: LevelFilter,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opts = Opts::from_args();

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("rov_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(opts.log_level, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Rover Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    debug!("Options: {:?}", opts);

    // ---- LOAD PARAMETERS ----

    let exec_params: RovExecParams = load_params("rov_exec.toml");
    if !exec_params.are_valid() {
        return Err(color_eyre::eyre::eyre!("Invalid rov_exec parameters"));
    }

    let map_image_path = if exec_params.map_image_path.is_empty() {
        None
    } else {
        let mut path = host::get_rover_sw_root().unwrap_or_else(|_| PathBuf::from("."));
        path.push(&exec_params.map_image_path);
        Some(path)
    };

    let params = RoverParams {
        motor_ctrl: load_params::<motor_ctrl::Params>("motor_ctrl.toml"),
        scanner: load_params::<scanner::Params>("scanner.toml"),
        occ_grid: load_params::<occ_grid::Params>("occ_grid.toml"),
        auto: load_params::<auto::Params>("auto.toml"),
        map_image_path,
        pin_arbiter_poll_s: exec_params.pin_arbiter_poll_s,
    };

    info!("Exec parameters loaded");

    // ---- INITIALISE HARDWARE ----

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let board = init_board(&opts, &exec_params, &params.scanner, clock.clone())
        .wrap_err("Failed to initialise the hardware")?;

    let rover = Arc::new(
        Rover::new(board, clock.clone(), params).wrap_err("Failed to initialise the rover")?,
    );

    // Always have a map image, even before the first scan
    if let Some(path) = &rover.params().map_image_path {
        if let Err(e) = rover.render_map(path) {
            warn!("Could not write the initial map: {}", e);
        }
    }

    info!("Initialisation complete\n");

    // ---- RUN ----

    if opts.motor_test {
        motor_test(&rover, &*clock);
    } else if opts.sonar_test {
        sonar_test(&rover);
    } else {
        let loop_rover = rover.clone();
        let loop_handle = thread::Builder::new()
            .name(String::from("auto"))
            .spawn(move || auto::run(&loop_rover))
            .wrap_err("Failed to start the control loop")?;

        console(&rover).wrap_err("Console failed")?;

        rover.shutdown();
        if loop_handle.join().is_err() {
            error!("Control loop panicked");
        }
    }

    // ---- SHUTDOWN ----

    if !rover.is_shutdown() {
        rover.shutdown();
    }
    info!("End of execution");
    session.exit();

    Ok(())
}

/// Load a parameter file, falling back to the defaults if it can't be loaded.
fn load_params<P>(file: &str) -> P
where
    P: serde::de::DeserializeOwned + Default,
{
    match util::params::load(file) {
        Ok(p) => p,
        Err(e) => {
            warn!("Could not load {}, using defaults: {}", file, e);
            P::default()
        }
    }
}

#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
fn init_board(
    opts: &Opts,
    exec_params: &RovExecParams,
    scanner_params: &scanner::Params,
    clock: Arc<dyn Clock>,
) -> Result<Board, Report> {
    if opts.sim {
        Ok(sim_board(scanner_params, clock))
    } else {
        info!("Opening GPIO");
        Ok(rov_lib::hal::rpi::init(&exec_params.pins)?)
    }
}

#[cfg(not(any(target_arch = "arm", target_arch = "aarch64")))]
fn init_board(
    opts: &Opts,
    _exec_params: &RovExecParams,
    scanner_params: &scanner::Params,
    clock: Arc<dyn Clock>,
) -> Result<Board, Report> {
    if !opts.sim {
        warn!("No GPIO on this platform, using the simulated board");
    }
    Ok(sim_board(scanner_params, clock))
}

/// A simulated board facing a flat wall.
fn sim_board(scanner_params: &scanner::Params, clock: Arc<dyn Clock>) -> Board {
    info!("Using simulated board, wall {} cm ahead", SIM_WALL_CM);

    // Runs indefinitely, so nothing needs the event log
    let sim = SimBoard::with_event_log_capacity(clock, 0);
    let params = scanner_params.clone();
    sim.set_range_fn(move |duty| {
        let bearing = (params.duty_to_angle(duty?) - params.forward_servo_deg).to_radians();
        let range = SIM_WALL_CM / bearing.cos();
        if range.is_finite() && range > 0.0 && range <= params.ranging.max_range_cm {
            Some(range)
        } else {
            None
        }
    });

    sim.board()
}

/// Drive each manoeuvre briefly, stopping in between.
fn motor_test(rover: &Rover, clock: &dyn Clock) {
    info!("Running motor test");

    let motors = rover.motors();
    if let Err(e) = motors.enable() {
        error!("Could not enable motors: {}", e);
        return;
    }

    let mnvrs = [
        motor_ctrl::Manoeuvre::Forward,
        motor_ctrl::Manoeuvre::Back,
        motor_ctrl::Manoeuvre::Left,
        motor_ctrl::Manoeuvre::Right,
    ];

    for mnvr in mnvrs.iter() {
        info!("{:?}", mnvr);
        if let Err(e) = motors.drive(*mnvr, None) {
            error!("{:?} failed: {}", mnvr, e);
            break;
        }
        clock.sleep(Duration::from_secs_f64(MOTOR_TEST_MNVR_S));

        if let Err(e) = motors.stop(false) {
            warn!("Could not stop motors: {}", e);
        }
        clock.sleep(Duration::from_secs_f64(MOTOR_TEST_PAUSE_S));
    }

    motors.disable();
    info!("Motor test complete");
}

/// Run one sweep with the motors disabled, print the start of it and update the map.
fn sonar_test(rover: &Rover) {
    info!("Running sonar test");
    rover.motors().disable();

    let samples = match rover.scan() {
        Ok(s) => s,
        Err(e) => {
            error!("Scan failed: {}", e);
            return;
        }
    };

    println!("{} samples", samples.len());
    for s in samples.iter().take(SONAR_TEST_NUM_PRINTED) {
        println!(
            "{:>5.1} deg  {:>6.1} cm  ({:>6.1}, {:>6.1})",
            s.sweep_angle_deg, s.distance_cm, s.local_x_cm, s.local_y_cm
        );
    }

    rover.fuse(&samples);
    info!("Sonar test complete");
}

/// Read commands from the terminal until `quit` or end of input.
fn console(rover: &Rover) -> Result<(), ReadlineError> {
    let mut rl = DefaultEditor::new()?;

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e),
        };

        if line.trim().is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line.as_str());

        let tc = match Tc::from_line(&line) {
            Ok(tc) => tc,
            Err(e) => {
                println!("{}", e.message);
                continue;
            }
        };

        if !process_tc(rover, tc) {
            break;
        }
    }

    Ok(())
}

/// Execute a telecommand, returning false if the rover should stop.
fn process_tc(rover: &Rover, tc: Tc) -> bool {
    debug!("TC: {:?}", tc);

    if let Some(cmd) = tc.drive_cmd() {
        print_json(&rover.handle_command(cmd));
        return true;
    }

    match tc {
        Tc::Auto { enabled } => print_json(&rover.set_auto(enabled)),
        Tc::Speed { speed_pct } => match rover.set_speed(speed_pct) {
            Ok(s) => println!("speed {} %", s),
            Err(e) => println!("error: {}", e),
        },
        Tc::Status => print_json(&rover.status()),
        Tc::Quit => return false,
        _ => (),
    }

    true
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!("Could not serialise response: {}", e),
    }
}
