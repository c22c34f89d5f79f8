//! # Rover Executable Parameters
//!
//! This module provide parameters for the rover executable itself, i.e. those not owned by any
//! one module.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RovExecParams {
    /// GPIO pin assignment
    pub pins: PinParams,

    /// Path the rendered occupancy map is written to, relative to the software root. No map image
    /// is written if empty.
    pub map_image_path: String,

    /// Period at which the pin arbiter polls for the shared pin to be released.
    ///
    /// Units: seconds
    pub pin_arbiter_poll_s: f64,
}

/// BCM pin numbers of all lines used by the rover.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PinParams {
    /// Scanner pan servo signal
    pub servo: u8,

    /// Ultrasonic trigger output
    pub sonar_trig: u8,

    /// Ultrasonic echo input
    pub sonar_echo: u8,

    /// Motor driver standby
    pub stby: u8,

    /// Motor driver channel A speed, may be the same pin as `servo`
    pub left_pwm: u8,

    /// Motor driver channel A direction
    pub ain1: u8,
    pub ain2: u8,

    /// Motor driver channel B speed
    pub right_pwm: u8,

    /// Motor driver channel B direction
    pub bin1: u8,
    pub bin2: u8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for RovExecParams {
    fn default() -> Self {
        Self {
            pins: PinParams::default(),
            map_image_path: String::from("static/map.png"),
            pin_arbiter_poll_s: 0.01,
        }
    }
}

impl RovExecParams {
    pub fn are_valid(&self) -> bool {
        self.pin_arbiter_poll_s > 0.0 && self.pins.are_valid()
    }
}

impl Default for PinParams {
    fn default() -> Self {
        Self {
            servo: 12,
            sonar_trig: 23,
            sonar_echo: 24,
            stby: 25,
            left_pwm: 12,
            ain1: 5,
            ain2: 6,
            right_pwm: 13,
            bin1: 20,
            bin2: 21,
        }
    }
}

impl PinParams {
    /// Pins are valid if every line except the shared servo/left PWM pin is distinct.
    pub fn are_valid(&self) -> bool {
        let mut pins = vec![
            self.sonar_trig,
            self.sonar_echo,
            self.stby,
            self.left_pwm,
            self.ain1,
            self.ain2,
            self.right_pwm,
            self.bin1,
            self.bin2,
        ];
        if self.servo != self.left_pwm {
            pins.push(self.servo);
        }

        let num = pins.len();
        pins.sort_unstable();
        pins.dedup();

        pins.len() == num
    }
}
