//! # Ranging scanner module
//!
//! The scanner is an ultrasonic range sensor mounted on a pan servo. A scan sweeps the servo
//! across a fixed window and takes a robust range reading at each angle, producing a list of
//! [`RangeSample`]s in the rover's own frame (x to the right, y forward).
//!
//! The servo's signal pin is shared with the left motor's PWM input, so a scan holds the
//! [`PinArbiter`](crate::pin_arbiter::PinArbiter) lease for its whole duration and always gives it
//! back before returning.
//!
//! Readings are made robust in two stages. Within one angle several pings are summarised by
//! [`ranging::robust_distance`], which rejects scattered bad pings. Across angles a continuity
//! gate rejects readings which jump too far from the last accepted one.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod params;
pub mod ranging;
pub mod state;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use params::*;
pub use state::*;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use nalgebra::Point2;
use serde::Serialize;

use crate::{hal::HalError, pin_arbiter::PinOwner};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single accepted range observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeSample {
    /// Angle the servo was commanded to
    ///
    /// Units: degrees
    pub sweep_angle_deg: f64,

    /// Angle from straight ahead, positive to the right
    ///
    /// Units: degrees
    pub bearing_deg: f64,

    /// Units: centimeters
    pub distance_cm: f64,

    /// Position of the reflection in the rover frame.
    ///
    /// Units: centimeters
    pub local_x_cm: f64,
    pub local_y_cm: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Reasons a scan could not be completed.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Servo PWM busy, the shared pin is held by {0:?}")]
    PinBusy(Option<PinOwner>),

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Invalid scanner parameters")]
    InvalidParams,

    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),
}

/// Reasons a single ping or reading gave no distance.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("Echo did not rise")]
    EchoRiseTimeout,

    #[error("Echo did not fall")]
    EchoFallTimeout,

    #[error("Distance of {0:.1} cm is outside the valid range")]
    OutOfRange(f64),

    #[error("Only {valid} valid pings, at least {required} needed")]
    InsufficientSamples { valid: usize, required: usize },

    #[error("Only {inliers} pings near the median, at least {required} needed")]
    InsufficientInliers { inliers: usize, required: usize },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RangeSample {
    /// Build a sample from the commanded servo angle and measured distance.
    ///
    /// `forward_angle_deg` is the servo angle which points straight ahead.
    pub fn new(sweep_angle_deg: f64, forward_angle_deg: f64, distance_cm: f64) -> Self {
        let bearing_deg = sweep_angle_deg - forward_angle_deg;
        let bearing_rad = bearing_deg.to_radians();

        Self {
            sweep_angle_deg,
            bearing_deg,
            distance_cm,
            local_x_cm: distance_cm * bearing_rad.sin(),
            local_y_cm: distance_cm * bearing_rad.cos(),
        }
    }

    /// Reflection point in the rover frame.
    pub fn local_point(&self) -> Point2<f64> {
        Point2::new(self.local_x_cm, self.local_y_cm)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sample_geometry() {
        let s = RangeSample::new(90.0, 90.0, 50.0);
        assert_eq!(s.bearing_deg, 0.0);
        assert!(s.local_x_cm.abs() < 1e-9);
        assert!((s.local_y_cm - 50.0).abs() < 1e-9);

        // Right of forward is +x
        let s = RangeSample::new(135.0, 90.0, 100.0);
        assert_eq!(s.bearing_deg, 45.0);
        assert!((s.local_x_cm - 70.7107).abs() < 1e-3);
        assert!((s.local_y_cm - 70.7107).abs() < 1e-3);

        let s = RangeSample::new(45.0, 90.0, 100.0);
        assert!(s.local_x_cm < 0.0);
        assert_eq!(s.local_point(), Point2::new(s.local_x_cm, s.local_y_cm));
    }
}
