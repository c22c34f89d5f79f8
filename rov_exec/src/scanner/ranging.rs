//! # Ultrasonic ranging
//!
//! A ping fires a short trigger pulse and times the width of the echo pulse, which is
//! proportional to the distance to the reflecting surface. Both edges of the echo are waited for
//! by polling against a timeout, so no ping can block for longer than the sum of the timeouts.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::time::Duration;

use log::trace;
use util::maths::median;

use super::{RangingParams, SensorError};
use crate::hal::{Clock, InputLine, OutputLine};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Half the speed of sound, converting echo pulse width to one-way distance.
///
/// Units: centimeters/second
pub const HALF_SPEED_OF_SOUND_CM_S: f64 = 17_150.0;

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Take a single ping, returning the measured distance in centimeters.
pub fn ping(
    trig: &mut dyn OutputLine,
    echo: &dyn InputLine,
    clock: &dyn Clock,
    params: &RangingParams,
) -> Result<f64, SensorError> {
    let rise_timeout = Duration::from_secs_f64(params.echo_rise_timeout_s);
    let fall_timeout = Duration::from_secs_f64(params.echo_fall_timeout_s);

    trig.set_low();
    clock.sleep(Duration::from_micros(params.trigger_settle_us));
    trig.set_high();
    clock.sleep(Duration::from_micros(params.trigger_pulse_us));
    trig.set_low();

    let t0 = clock.now();
    while !echo.is_high() {
        if clock.now() - t0 > rise_timeout {
            return Err(SensorError::EchoRiseTimeout);
        }
    }

    let start = clock.now();
    while echo.is_high() {
        if clock.now() - start > fall_timeout {
            return Err(SensorError::EchoFallTimeout);
        }
    }
    let end = clock.now();

    Ok((end - start).as_secs_f64() * HALF_SPEED_OF_SOUND_CM_S)
}

/// Summarise a series of pings into one robust distance.
///
/// At most `samples_per_reading` pings are drawn from `pings`. Pings which failed or gave an
/// implausible distance are dropped. The remaining pings are reduced to those within the inlier
/// band of their median, and the median of those is returned.
pub fn robust_distance<I>(pings: I, params: &RangingParams) -> Result<f64, SensorError>
where
    I: IntoIterator<Item = Result<f64, SensorError>>,
{
    let samples: Vec<f64> = pings
        .into_iter()
        .take(params.samples_per_reading)
        .filter_map(|p| match p {
            Ok(d) if params.is_plausible(d) => Some(d),
            Ok(d) => {
                trace!("Ping rejected: {}", SensorError::OutOfRange(d));
                None
            }
            Err(e) => {
                trace!("Ping rejected: {}", e);
                None
            }
        })
        .collect();

    let insufficient = SensorError::InsufficientSamples {
        valid: samples.len(),
        required: params.min_valid_samples,
    };
    if samples.len() < params.min_valid_samples {
        return Err(insufficient);
    }

    let med = median(&samples).ok_or(insufficient)?;

    let inliers: Vec<f64> = samples
        .iter()
        .copied()
        .filter(|d| (d - med).abs() <= params.inlier_band_cm)
        .collect();

    if inliers.len() < params.min_inliers {
        return Err(SensorError::InsufficientInliers {
            inliers: inliers.len(),
            required: params.min_inliers,
        });
    }

    median(&inliers).ok_or(SensorError::InsufficientInliers {
        inliers: 0,
        required: params.min_inliers,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::sim::{SimBoard, SimClock};
    use std::sync::Arc;

    fn pings(values: &[Option<f64>]) -> Vec<Result<f64, SensorError>> {
        values
            .iter()
            .map(|v| v.ok_or(SensorError::EchoRiseTimeout))
            .collect()
    }

    #[test]
    fn test_all_within_band() {
        let params = RangingParams::default();
        let p = pings(&[Some(50.0), Some(52.0), Some(49.0), Some(51.0), Some(48.0), Some(53.0), Some(50.5)]);

        assert_eq!(robust_distance(p, &params), Ok(50.5));
    }

    #[test]
    fn test_outliers_excluded() {
        let params = RangingParams::default();
        let clean = [Some(100.0), Some(102.0), Some(98.0), Some(101.0), Some(99.0)];
        let expected = robust_distance(pings(&clean), &params).unwrap();
        assert_eq!(expected, 100.0);

        let noisy = [Some(100.0), Some(300.0), Some(102.0), Some(98.0), Some(20.0), Some(101.0), Some(99.0)];
        assert_eq!(robust_distance(pings(&noisy), &params), Ok(expected));
    }

    #[test]
    fn test_too_few_valid() {
        let params = RangingParams::default();

        // Timeouts and implausible distances don't count
        let p = pings(&[Some(80.0), None, None, Some(0.5), Some(81.0), Some(900.0), None]);
        assert_eq!(
            robust_distance(p, &params),
            Err(SensorError::InsufficientSamples { valid: 2, required: 3 })
        );

        assert!(matches!(
            robust_distance(Vec::new(), &params),
            Err(SensorError::InsufficientSamples { valid: 0, .. })
        ));
    }

    #[test]
    fn test_too_few_inliers() {
        let params = RangingParams::default();
        let p = pings(&[Some(10.0), Some(100.0), Some(200.0), None, None, None, None]);

        assert_eq!(
            robust_distance(p, &params),
            Err(SensorError::InsufficientInliers { inliers: 1, required: 2 })
        );
    }

    #[test]
    fn test_takes_at_most_n_pings() {
        let params = RangingParams::default();
        let mut drawn = 0;
        let p = std::iter::repeat_with(|| {
            drawn += 1;
            Ok(40.0)
        });

        assert_eq!(robust_distance(p, &params), Ok(40.0));
        assert_eq!(drawn, 7);
    }

    #[test]
    fn test_ping_timing() {
        let clock = Arc::new(SimClock::new());
        let sim = SimBoard::new(clock.clone());
        let mut board = sim.board();
        let params = RangingParams::default();

        // Last range is beyond what the fall timeout allows
        sim.push_ranges(vec![Some(123.0), None, Some(1000.0)]);

        let d = ping(&mut *board.scanner.trig, &*board.scanner.echo, &*clock, &params).unwrap();
        assert!((d - 123.0).abs() < 0.5, "{}", d);

        assert_eq!(
            ping(&mut *board.scanner.trig, &*board.scanner.echo, &*clock, &params),
            Err(SensorError::EchoRiseTimeout)
        );
        assert_eq!(
            ping(&mut *board.scanner.trig, &*board.scanner.echo, &*clock, &params),
            Err(SensorError::EchoFallTimeout)
        );
    }
}
