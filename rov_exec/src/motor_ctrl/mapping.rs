//! # Logical to physical channel mapping
//!
//! Manoeuvres are defined in terms of the rover's left and right sides. The functions here turn
//! them into the levels of the driver's direction inputs and the duty cycles of its PWM inputs,
//! applying the unit's [`MotorCalibration`]. Everything here is pure so that the mapping can be
//! checked for every calibration without any hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use util::maths::clamp;

use super::MotorCalibration;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A value for each logical side of the rover.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sides<T> {
    pub left: T,
    pub right: T,
}

/// Levels of the two direction inputs of one H-bridge channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BridgeInputs {
    pub in1: bool,
    pub in2: bool,
}

/// Levels of the direction inputs of both physical channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhysicalBits {
    pub ain1: bool,
    pub ain2: bool,
    pub bin1: bool,
    pub bin2: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Driving manoeuvres. Turns are made in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Manoeuvre {
    Forward,
    Back,
    Left,
    Right,
}

/// Drive state of one motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Forward,
    Backward,
    Coast,
    Brake,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<T: Copy> Sides<T> {
    pub fn both(value: T) -> Self {
        Self {
            left: value,
            right: value,
        }
    }
}

impl Manoeuvre {
    /// Direction of each side needed to perform this manoeuvre.
    pub fn side_directions(self) -> Sides<Direction> {
        use Direction::*;

        match self {
            Manoeuvre::Forward => Sides::both(Forward),
            Manoeuvre::Back => Sides::both(Backward),
            Manoeuvre::Left => Sides {
                left: Backward,
                right: Forward,
            },
            Manoeuvre::Right => Sides {
                left: Forward,
                right: Backward,
            },
        }
    }
}

impl Direction {
    /// Direction inputs for this direction on a channel wired the right way round.
    pub fn inputs(self) -> BridgeInputs {
        let (in1, in2) = match self {
            Direction::Forward => (true, false),
            Direction::Backward => (false, true),
            Direction::Coast => (false, false),
            Direction::Brake => (true, true),
        };
        BridgeInputs { in1, in2 }
    }
}

impl BridgeInputs {
    pub fn swapped(self) -> Self {
        Self {
            in1: self.in2,
            in2: self.in1,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Map the direction of each logical side onto the physical direction inputs.
pub fn logical_to_physical(dirs: Sides<Direction>, cal: &MotorCalibration) -> PhysicalBits {
    let mut left = dirs.left.inputs();
    let mut right = dirs.right.inputs();

    if cal.left_invert {
        left = left.swapped();
    }
    if cal.right_invert {
        right = right.swapped();
    }

    let (a, b) = if cal.swap_sides {
        (right, left)
    } else {
        (left, right)
    };

    PhysicalBits {
        ain1: a.in1,
        ain2: a.in2,
        bin1: b.in1,
        bin2: b.in2,
    }
}

/// Physical direction inputs for a manoeuvre.
pub fn manoeuvre_to_physical(mnvr: Manoeuvre, cal: &MotorCalibration) -> PhysicalBits {
    logical_to_physical(mnvr.side_directions(), cal)
}

/// Trimmed duty cycle of each side for the given speed, clamped to 0..=100 %.
pub fn side_duties(speed_pct: u8, cal: &MotorCalibration) -> Sides<f64> {
    let speed = speed_pct as f64;
    Sides {
        left: clamp(speed * cal.left_trim, 0.0, 100.0),
        right: clamp(speed * cal.right_trim, 0.0, 100.0),
    }
}

/// Route the duty cycle of each side to the physical channels, returned as `(a, b)`.
pub fn physical_duties(duties: Sides<f64>, cal: &MotorCalibration) -> (f64, f64) {
    if cal.swap_sides {
        (duties.right, duties.left)
    } else {
        (duties.left, duties.right)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cal(left_invert: bool, right_invert: bool, swap_sides: bool) -> MotorCalibration {
        MotorCalibration {
            left_invert,
            right_invert,
            swap_sides,
            ..Default::default()
        }
    }

    /// Parse `"ain1 ain2 bin1 bin2"` written as four binary digits.
    fn bits(s: &str) -> PhysicalBits {
        let b: Vec<bool> = s.chars().map(|c| c == '1').collect();
        PhysicalBits {
            ain1: b[0],
            ain2: b[1],
            bin1: b[2],
            bin2: b[3],
        }
    }

    #[test]
    fn test_default_wiring() {
        let c = MotorCalibration::default();

        assert_eq!(
            manoeuvre_to_physical(Manoeuvre::Forward, &c),
            PhysicalBits { ain1: true, ain2: false, bin1: true, bin2: false }
        );
        assert_eq!(
            manoeuvre_to_physical(Manoeuvre::Back, &c),
            PhysicalBits { ain1: false, ain2: true, bin1: false, bin2: true }
        );
        assert_eq!(
            manoeuvre_to_physical(Manoeuvre::Left, &c),
            PhysicalBits { ain1: false, ain2: true, bin1: true, bin2: false }
        );
        assert_eq!(
            manoeuvre_to_physical(Manoeuvre::Right, &c),
            PhysicalBits { ain1: true, ain2: false, bin1: false, bin2: true }
        );
    }

    #[test]
    fn test_all_calibrations() {
        const MNVRS: [Manoeuvre; 4] = [
            Manoeuvre::Forward,
            Manoeuvre::Back,
            Manoeuvre::Left,
            Manoeuvre::Right,
        ];

        // (left_invert, right_invert, swap_sides, bits for forward, back, left, right)
        let table = [
            (false, false, false, ["1010", "0101", "0110", "1001"]),
            (false, false, true, ["1010", "0101", "1001", "0110"]),
            (false, true, false, ["1001", "0110", "0101", "1010"]),
            (false, true, true, ["0110", "1001", "0101", "1010"]),
            (true, false, false, ["0110", "1001", "1010", "0101"]),
            (true, false, true, ["1001", "0110", "1010", "0101"]),
            (true, true, false, ["0101", "1010", "1001", "0110"]),
            (true, true, true, ["0101", "1010", "0110", "1001"]),
        ];

        for &(li, ri, swap, expected) in &table {
            let c = cal(li, ri, swap);
            for (mnvr, bits_str) in MNVRS.iter().zip(expected.iter()) {
                assert_eq!(
                    manoeuvre_to_physical(*mnvr, &c),
                    bits(bits_str),
                    "{:?} with {:?}",
                    mnvr,
                    c
                );
            }
        }
    }

    #[test]
    fn test_swap_and_invert() {
        // Left inverted and sides swapped, so channel B carries the inverted left side
        let c = cal(true, false, true);
        assert_eq!(
            manoeuvre_to_physical(Manoeuvre::Forward, &c),
            PhysicalBits { ain1: true, ain2: false, bin1: false, bin2: true }
        );
    }

    #[test]
    fn test_coast_brake_unaffected_by_invert() {
        let c = cal(true, true, true);
        assert_eq!(
            logical_to_physical(Sides::both(Direction::Coast), &c),
            PhysicalBits { ain1: false, ain2: false, bin1: false, bin2: false }
        );
        assert_eq!(
            logical_to_physical(Sides::both(Direction::Brake), &c),
            PhysicalBits { ain1: true, ain2: true, bin1: true, bin2: true }
        );
    }

    #[test]
    fn test_duties() {
        let c = MotorCalibration {
            left_trim: 1.5,
            right_trim: 0.5,
            swap_sides: true,
            ..Default::default()
        };

        let d = side_duties(80, &c);
        assert_eq!(d.left, 100.0);
        assert_eq!(d.right, 40.0);

        assert_eq!(physical_duties(d, &c), (40.0, 100.0));
        assert_eq!(physical_duties(d, &MotorCalibration::default()), (100.0, 40.0));

        let d = side_duties(0, &c);
        assert_eq!(d, Sides::both(0.0));
    }
}
