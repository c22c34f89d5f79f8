//! Parameters structure for the Scanner

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use serde::{Deserialize, Serialize};
use util::maths::{clamp, lin_map};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the ranging scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    // ---- SERVO ----
    /// Units: Hertz
    pub servo_pwm_frequency_hz: f64,

    /// Duty cycle commanding a servo angle of 0 degrees.
    ///
    /// Units: percent
    pub servo_duty_min_pct: f64,

    /// Duty cycle commanding a servo angle of 180 degrees.
    ///
    /// Units: percent
    pub servo_duty_max_pct: f64,

    /// Calibration offset added to every commanded angle.
    ///
    /// Units: degrees
    pub angle_offset_deg: f64,

    /// Servo angle pointing straight ahead.
    ///
    /// Units: degrees
    pub forward_servo_deg: f64,

    // ---- SWEEP ----
    /// Units: degrees
    pub sweep_min_deg: f64,

    /// Units: degrees
    pub sweep_max_deg: f64,

    /// Units: degrees
    pub sweep_step_deg: f64,

    /// Time allowed for the servo to reach each angle.
    ///
    /// Units: seconds
    pub servo_settle_s: f64,

    /// Time allowed after starting the servo PWM.
    ///
    /// Units: seconds
    pub servo_start_settle_s: f64,

    /// Time the servo PWM is held at zero duty before being stopped.
    ///
    /// Units: seconds
    pub servo_stop_delay_s: f64,

    /// Maximum difference from the last accepted reading of the same sweep.
    ///
    /// Units: centimeters
    pub max_jump_cm: f64,

    // ---- SHARED PIN ----
    /// Units: seconds
    pub lease_timeout_s: f64,

    /// Time the shared pin is left idle before it is released.
    ///
    /// Units: seconds
    pub pin_settle_s: f64,

    /// Ranging parameters
    pub ranging: RangingParams,
}

/// Parameters for taking a single robust range reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingParams {
    /// Number of pings taken per reading
    pub samples_per_reading: usize,

    /// Minimum number of valid pings needed for a reading
    pub min_valid_samples: usize,

    /// Minimum number of pings near the median needed for a reading
    pub min_inliers: usize,

    /// Distance from the median within which a ping is an inlier.
    ///
    /// Units: centimeters
    pub inlier_band_cm: f64,

    /// Units: centimeters
    pub min_range_cm: f64,

    /// Units: centimeters
    pub max_range_cm: f64,

    /// Units: seconds
    pub echo_rise_timeout_s: f64,

    /// Measured from the rising edge.
    ///
    /// Units: seconds
    pub echo_fall_timeout_s: f64,

    /// Units: seconds
    pub inter_ping_s: f64,

    /// Time the trigger is held low before a ping.
    ///
    /// Units: microseconds
    pub trigger_settle_us: u64,

    /// Units: microseconds
    pub trigger_pulse_us: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            servo_pwm_frequency_hz: 50.0,
            servo_duty_min_pct: 2.5,
            servo_duty_max_pct: 12.5,
            angle_offset_deg: 0.0,
            forward_servo_deg: 90.0,
            sweep_min_deg: 45.0,
            sweep_max_deg: 135.0,
            sweep_step_deg: 5.0,
            servo_settle_s: 0.1,
            servo_start_settle_s: 0.05,
            servo_stop_delay_s: 0.02,
            max_jump_cm: 30.0,
            lease_timeout_s: 2.0,
            pin_settle_s: 0.1,
            ranging: RangingParams::default(),
        }
    }
}

impl Default for RangingParams {
    fn default() -> Self {
        Self {
            samples_per_reading: 7,
            min_valid_samples: 3,
            min_inliers: 2,
            inlier_band_cm: 15.0,
            min_range_cm: 1.0,
            max_range_cm: 450.0,
            echo_rise_timeout_s: 0.020,
            echo_fall_timeout_s: 0.025,
            inter_ping_s: 0.010,
            trigger_settle_us: 200,
            trigger_pulse_us: 10,
        }
    }
}

impl Params {
    pub fn are_valid(&self) -> bool {
        let angle = 0.0..=180.0;

        self.servo_pwm_frequency_hz > 0.0
            && (0.0..=100.0).contains(&self.servo_duty_min_pct)
            && (0.0..=100.0).contains(&self.servo_duty_max_pct)
            && self.servo_duty_min_pct < self.servo_duty_max_pct
            && angle.contains(&self.forward_servo_deg)
            && angle.contains(&self.sweep_min_deg)
            && angle.contains(&self.sweep_max_deg)
            && self.sweep_min_deg <= self.sweep_max_deg
            && self.sweep_step_deg > 0.0
            && self.max_jump_cm >= 0.0
            && self.servo_settle_s >= 0.0
            && self.servo_start_settle_s >= 0.0
            && self.servo_stop_delay_s >= 0.0
            && self.lease_timeout_s >= 0.0
            && self.pin_settle_s >= 0.0
            && self.ranging.are_valid()
    }

    /// The servo angles visited by a sweep, in ascending order, both ends included.
    pub fn sweep_angles(&self) -> Vec<f64> {
        if !(self.sweep_step_deg > 0.0) || self.sweep_max_deg < self.sweep_min_deg {
            return Vec::new();
        }

        // Small tolerance so that a max which is a whole number of steps away is included
        let num = ((self.sweep_max_deg - self.sweep_min_deg) / self.sweep_step_deg + 1e-9).floor()
            as usize
            + 1;

        (0..num)
            .map(|i| self.sweep_min_deg + i as f64 * self.sweep_step_deg)
            .collect()
    }

    /// Servo duty cycle for an angle, after applying the calibration offset.
    pub fn angle_to_duty(&self, angle_deg: f64) -> f64 {
        let cmd = clamp(angle_deg + self.angle_offset_deg, 0.0, 180.0);
        lin_map(
            (0.0, 180.0),
            (self.servo_duty_min_pct, self.servo_duty_max_pct),
            cmd,
        )
    }

    /// Servo angle, before the calibration offset, which gives this duty cycle.
    pub fn duty_to_angle(&self, duty_pct: f64) -> f64 {
        lin_map(
            (self.servo_duty_min_pct, self.servo_duty_max_pct),
            (0.0, 180.0),
            duty_pct,
        ) - self.angle_offset_deg
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.lease_timeout_s)
    }
}

impl RangingParams {
    pub fn are_valid(&self) -> bool {
        self.samples_per_reading > 0
            && self.min_valid_samples > 0
            && self.min_valid_samples <= self.samples_per_reading
            && self.min_inliers > 0
            && self.min_inliers <= self.min_valid_samples
            && self.inlier_band_cm >= 0.0
            && self.min_range_cm >= 0.0
            && self.min_range_cm < self.max_range_cm
            && self.echo_rise_timeout_s > 0.0
            && self.echo_fall_timeout_s > 0.0
            && self.inter_ping_s >= 0.0
    }

    /// True if the distance is physically plausible for the sensor.
    pub fn is_plausible(&self, distance_cm: f64) -> bool {
        distance_cm >= self.min_range_cm && distance_cm <= self.max_range_cm
    }
}
