//! Parameters structure for MotorCtrl

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for motor control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Frequency of the motor PWM.
    ///
    /// Units: Hertz
    pub pwm_frequency_hz: f64,

    /// Speed used before any speed has been commanded.
    ///
    /// Units: percent
    pub default_speed_pct: u8,

    /// Maximum time to wait for the shared pin when enabling.
    ///
    /// Units: seconds
    pub lease_timeout_s: f64,

    /// Time the shared pin is left idle after disabling, before anyone else may drive it.
    ///
    /// Units: seconds
    pub pin_settle_s: f64,

    /// Time the PWM is held at zero duty before being stopped.
    ///
    /// Units: seconds
    pub pwm_stop_delay_s: f64,

    /// Wiring calibration of this unit
    pub calibration: MotorCalibration,
}

/// Describes how the logical motors are wired to the driver on a particular unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorCalibration {
    /// Multiplier applied to the left side's duty cycle
    pub left_trim: f64,

    /// Multiplier applied to the right side's duty cycle
    pub right_trim: f64,

    /// Swap the direction inputs of the left side
    pub left_invert: bool,

    /// Swap the direction inputs of the right side
    pub right_invert: bool,

    /// Drive the left side from physical channel B and the right side from channel A
    pub swap_sides: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            pwm_frequency_hz: 1000.0,
            default_speed_pct: 60,
            lease_timeout_s: 2.0,
            pin_settle_s: 0.1,
            pwm_stop_delay_s: 0.02,
            calibration: MotorCalibration::default(),
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> bool {
        self.pwm_frequency_hz > 0.0
            && self.default_speed_pct <= 100
            && self.lease_timeout_s >= 0.0
            && self.pin_settle_s >= 0.0
            && self.pwm_stop_delay_s >= 0.0
            && self.calibration.are_valid()
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.lease_timeout_s)
    }

    pub fn pin_settle(&self) -> Duration {
        Duration::from_secs_f64(self.pin_settle_s)
    }

    pub fn pwm_stop_delay(&self) -> Duration {
        Duration::from_secs_f64(self.pwm_stop_delay_s)
    }
}

impl Default for MotorCalibration {
    fn default() -> Self {
        Self {
            left_trim: 1.0,
            right_trim: 1.0,
            left_invert: false,
            right_invert: false,
            swap_sides: false,
        }
    }
}

impl MotorCalibration {
    pub fn are_valid(&self) -> bool {
        self.left_trim.is_finite()
            && self.left_trim >= 0.0
            && self.right_trim.is_finite()
            && self.right_trim >= 0.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(Params::default().are_valid());
    }

    #[test]
    fn test_calibration_from_toml() {
        let params: Params = util::params::from_toml_str(
            "default_speed_pct = 40\n\
            [calibration]\n\
            right_trim = 0.9\n\
            swap_sides = true\n",
        )
        .unwrap();

        assert_eq!(params.default_speed_pct, 40);
        assert_eq!(params.calibration.left_trim, 1.0);
        assert_eq!(params.calibration.right_trim, 0.9);
        assert!(params.calibration.swap_sides);
        assert!(!params.calibration.left_invert);
        assert!(params.are_valid());
    }

    #[test]
    fn test_invalid() {
        let mut params = Params::default();
        params.calibration.left_trim = -0.5;
        assert!(!params.are_valid());

        let mut params = Params::default();
        params.default_speed_pct = 120;
        assert!(!params.are_valid());

        let mut params = Params::default();
        params.calibration.right_trim = f64::NAN;
        assert!(!params.are_valid());
    }
}
