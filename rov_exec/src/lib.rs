//! # Rover library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to access items defined
//! inside the rover crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Hardware abstraction - digital lines, PWM outputs and time, on the Pi or simulated
pub mod hal;

/// Pin arbiter - gives the motors and the scanner turns on the shared PWM pin
pub mod pin_arbiter;

/// Motor control module - drives the two sides of the rover through the H-bridge
pub mod motor_ctrl;

/// Ranging scanner module - sweeps the ultrasonic sensor and filters its readings
pub mod scanner;

/// Occupancy grid module - fuses scans into a map of free and occupied space
pub mod occ_grid;

/// Localisation module - the dead-reckoned pose of the rover
pub mod loc;

/// Autonomy module - the stop-scan-decide-move control loop
pub mod auto;

/// Data store - shared state of the rover
pub mod data_store;

/// Rover - owns every module and handles commands
pub mod rover;

/// Parameters for the executable itself
pub mod params;
