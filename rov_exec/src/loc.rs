//! # Localisation module
//!
//! The rover has no wheel encoders or inertial sensing, so its pose is dead reckoned: each
//! completed forward burst is assumed to move it a fixed nominal step along its current heading.
//! Other motions (reversing, turning, and manual drives of unknown duration) are not modelled at
//! all. Rather than guess at them, the pose counts how many such motions have happened since it
//! was last known, which gives consumers a measure of how far it can be trusted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::tm::PoseReport;
use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use util::maths::wrap_pi;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The pose of the rover in the world (map) frame.
///
/// The world frame is centred on the middle of the map with +y "up" the map. A heading of zero
/// faces +y, and the heading increases clockwise, towards +x.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Units: centimeters
    pub x_cm: f64,

    /// Units: centimeters
    pub y_cm: f64,

    /// Units: radians
    pub theta_rad: f64,

    /// Number of motions since startup which were not applied to the pose.
    pub unmodelled_motions: u32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Pose {
    pub fn new(x_cm: f64, y_cm: f64, theta_rad: f64) -> Self {
        Self {
            x_cm,
            y_cm,
            theta_rad,
            unmodelled_motions: 0,
        }
    }

    pub fn position(&self) -> Point2<f64> {
        Point2::new(self.x_cm, self.y_cm)
    }

    /// Heading wrapped into [-180, 180) degrees.
    pub fn heading_deg(&self) -> f64 {
        wrap_pi(self.theta_rad).to_degrees()
    }

    /// Transform from the rover frame (x right, y forward) into the world frame.
    pub fn rover_to_world(&self) -> Isometry2<f64> {
        // Headings are clockwise but nalgebra rotations are anticlockwise
        Isometry2::new(Vector2::new(self.x_cm, self.y_cm), -self.theta_rad)
    }

    /// Transform a point in the rover frame into the world frame.
    pub fn local_to_world(&self, local: &Point2<f64>) -> Point2<f64> {
        self.rover_to_world() * local
    }

    /// Move forward along the current heading.
    pub fn advance(&mut self, step_cm: f64) {
        self.x_cm += step_cm * self.theta_rad.sin();
        self.y_cm += step_cm * self.theta_rad.cos();
    }

    /// Record a motion which could not be applied to the pose.
    pub fn note_unmodelled_motion(&mut self) {
        self.unmodelled_motions = self.unmodelled_motions.saturating_add(1);
    }

    pub fn to_report(&self) -> PoseReport {
        PoseReport {
            x_cm: self.x_cm,
            y_cm: self.y_cm,
            theta_deg: self.heading_deg(),
            unmodelled_motions: self.unmodelled_motions,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn close(a: Point2<f64>, b: Point2<f64>) -> bool {
        (a - b).norm() < 1e-9
    }

    #[test]
    fn test_local_to_world() {
        // Facing +y, rover frame and world frame are aligned
        let pose = Pose::new(10.0, -20.0, 0.0);
        assert!(close(
            pose.local_to_world(&Point2::new(5.0, 30.0)),
            Point2::new(15.0, 10.0)
        ));

        // Facing +x, forward is +x and right is -y
        let pose = Pose::new(0.0, 0.0, FRAC_PI_2);
        assert!(close(
            pose.local_to_world(&Point2::new(0.0, 30.0)),
            Point2::new(30.0, 0.0)
        ));
        assert!(close(
            pose.local_to_world(&Point2::new(10.0, 0.0)),
            Point2::new(0.0, -10.0)
        ));
    }

    #[test]
    fn test_matches_explicit_rotation() {
        let pose = Pose::new(3.0, 4.0, 0.7);
        let (rx, ry) = (12.0, -5.0);
        let (s, c) = pose.theta_rad.sin_cos();

        let expected = Point2::new(3.0 + rx * c + ry * s, 4.0 - rx * s + ry * c);
        assert!(close(pose.local_to_world(&Point2::new(rx, ry)), expected));
    }

    #[test]
    fn test_advance() {
        let mut pose = Pose::default();
        pose.advance(6.0);
        assert!(close(pose.position(), Point2::new(0.0, 6.0)));

        pose.theta_rad = FRAC_PI_2;
        pose.advance(6.0);
        assert!(close(pose.position(), Point2::new(6.0, 6.0)));

        // Advancing agrees with transforming a point straight ahead
        let ahead = pose.local_to_world(&Point2::new(0.0, 6.0));
        pose.advance(6.0);
        assert!(close(pose.position(), ahead));
    }

    #[test]
    fn test_report() {
        let mut pose = Pose::new(1.0, 2.0, FRAC_PI_2);
        pose.note_unmodelled_motion();
        pose.note_unmodelled_motion();

        let report = pose.to_report();
        assert!((report.theta_deg - 90.0).abs() < 1e-9);
        assert_eq!(report.unmodelled_motions, 2);
        assert_eq!(report.x_cm, 1.0);

        // Headings are reported wrapped
        let pose = Pose::new(0.0, 0.0, 3.0 * FRAC_PI_2);
        assert!((pose.heading_deg() + 90.0).abs() < 1e-9);
    }
}
