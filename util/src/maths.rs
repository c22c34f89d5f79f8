//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::{Float, FloatConst};

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where 
    T: Float 
{
    target_range.0 
        + ((value - source_range.0) 
        * (target_range.1 - target_range.0) 
        / (source_range.1 - source_range.0))
}

/// Limit a value to the closed range `[min, max]`.
pub fn clamp<T>(value: T, min: T, max: T) -> T 
where
    T: PartialOrd
{
    if value > max {
        max
    }
    else if value < min {
        min
    }
    else {
        value
    }
}

/// Median of a set of values.
///
/// For an even number of values the mean of the two central values is returned. Returns `None` if
/// `values` is empty or contains a NaN.
pub fn median<T>(values: &[T]) -> Option<T>
where
    T: Float
{
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        let two = T::one() + T::one();
        Some((sorted[mid - 1] + sorted[mid]) / two)
    }
    else {
        Some(sorted[mid])
    }
}

/// Calculates the least nonnegative remainder of `lhs (mod rhs)`.
pub fn rem_euclid<T>(lhs: T, rhs: T) -> T
where
    T: Float
{
    let r = lhs % rhs;
    if r < T::zero() { r + rhs.abs() } else { r }
}

/// Wrap an angle in radians into the range [-pi, pi).
pub fn wrap_pi<T>(angle: T) -> T
where
    T: Float + FloatConst
{
    rem_euclid(angle + T::PI(), T::PI() + T::PI()) - T::PI()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        assert_eq!(lin_map((0.0, 180.0), (2.5, 12.5), 90.0), 7.5);
        assert_eq!(lin_map((0.0, 180.0), (2.5, 12.5), 0.0), 2.5);
        assert_eq!(lin_map((-1.0, 1.0), (0.0, 100.0), 1.0), 100.0);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(120, 0, 100), 100);
        assert_eq!(clamp(-3.0, 0.0, 180.0), 0.0);
        assert_eq!(clamp(42u8, 0, 100), 42);
    }

    #[test]
    fn test_median() {
        assert_eq!(median::<f64>(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[1.0, f64::NAN]), None);
    }

    #[test]
    fn test_wrap_pi() {
        const PI: f64 = std::f64::consts::PI;

        assert!((wrap_pi(3.0 * PI) - (-PI)).abs() < 1e-9);
        assert!((wrap_pi(0.5) - 0.5).abs() < 1e-9);
        assert!((wrap_pi(-PI - 0.5) - (PI - 0.5)).abs() < 1e-9);
    }
}
