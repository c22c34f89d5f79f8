//! # Hardware abstraction layer
//!
//! The rover core drives its hardware through the traits in this module rather than through GPIO
//! handles directly, so that everything above it can run against the simulated board in [`sim`].
//!
//! Two implementations are provided:
//! - [`rpi`] - Raspberry Pi GPIO via `rppal`, only built on ARM targets.
//! - [`sim`] - A simulated board which records every call and simulates the ultrasonic echo.
//!
//! The left drive motor's PWM input and the scanner servo share a single physical pin. Both
//! implementations hand out two [`PwmLine`] handles onto that pin, one in [`MotorIo`] and one in
//! [`ScannerIo`]. Nothing at this level stops them from being driven at once, that is the job of
//! the [`PinArbiter`](crate::pin_arbiter::PinArbiter).

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Raspberry Pi implementation
#[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
pub mod rpi;

/// Simulated implementation
pub mod sim;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    thread,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Delays shorter than this are busy-waited by the [`SystemClock`] rather than slept, since the OS
/// scheduler can't be relied on to wake us up in time.
const SPIN_THRESHOLD: Duration = Duration::from_micros(500);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A digital output.
pub trait OutputLine: Send {
    fn set(&mut self, level: Level);

    fn set_high(&mut self) {
        self.set(Level::High)
    }

    fn set_low(&mut self) {
        self.set(Level::Low)
    }
}

/// A digital input.
pub trait InputLine: Send {
    fn read(&self) -> Level;

    fn is_high(&self) -> bool {
        self.read() == Level::High
    }
}

/// A PWM output.
///
/// Duty cycles are given in percent, between 0.0 and 100.0 inclusive.
pub trait PwmLine: Send {
    /// Start generating PWM on the line.
    fn start(&mut self, frequency_hz: f64, duty_pct: f64) -> Result<(), HalError>;

    /// Change the duty cycle of a running PWM output.
    fn set_duty(&mut self, duty_pct: f64) -> Result<(), HalError>;

    /// Stop generating PWM and drive the line low.
    fn stop(&mut self) -> Result<(), HalError>;

    fn is_running(&self) -> bool;
}

/// Monotonic high resolution time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed epoch.
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The lines used to drive the dual H-bridge (TB6612FNG style) motor driver.
pub struct MotorIo {
    /// Driver standby line, the driver only outputs while this is high
    pub stby: Box<dyn OutputLine>,

    /// Direction inputs of physical channel A
    pub ain1: Box<dyn OutputLine>,
    pub ain2: Box<dyn OutputLine>,

    /// Direction inputs of physical channel B
    pub bin1: Box<dyn OutputLine>,
    pub bin2: Box<dyn OutputLine>,

    /// Speed input of physical channel A. This is the shared pin.
    pub pwm_a: Box<dyn PwmLine>,

    /// Speed input of physical channel B
    pub pwm_b: Box<dyn PwmLine>,
}

/// The lines used by the ranging scanner.
pub struct ScannerIo {
    /// Pan servo signal. This is the shared pin.
    pub servo: Box<dyn PwmLine>,

    /// Ultrasonic trigger
    pub trig: Box<dyn OutputLine>,

    /// Ultrasonic echo
    pub echo: Box<dyn InputLine>,
}

/// All hardware used by the rover.
pub struct Board {
    pub motors: MotorIo,
    pub scanner: ScannerIo,
}

/// Wall-clock implementation of [`Clock`].
pub struct SystemClock {
    epoch: Instant,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Duty cycle must be between 0 and 100 %, got {0}")]
    InvalidDutyCycle(f64),

    #[error("Frequency must be positive, got {0} Hz")]
    InvalidFrequency(f64),

    #[error("PWM output is not running")]
    PwmNotRunning,

    #[error("GPIO error: {0}")]
    Gpio(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Level {
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if duration < SPIN_THRESHOLD {
            let end = Instant::now() + duration;
            while Instant::now() < end {
                std::hint::spin_loop();
            }
        } else {
            thread::sleep(duration);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Check that a duty cycle and frequency are valid for a [`PwmLine`].
pub fn check_pwm_demand(frequency_hz: f64, duty_pct: f64) -> Result<(), HalError> {
    if !(frequency_hz > 0.0) {
        return Err(HalError::InvalidFrequency(frequency_hz));
    }
    check_duty(duty_pct)
}

/// Check that a duty cycle is within 0..=100 %.
pub fn check_duty(duty_pct: f64) -> Result<(), HalError> {
    if !(0.0..=100.0).contains(&duty_pct) {
        return Err(HalError::InvalidDutyCycle(duty_pct));
    }
    Ok(())
}
