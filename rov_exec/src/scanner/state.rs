//! Implementations for the Scanner state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{sync::Arc, time::Duration};

use log::{debug, info, trace, warn};

// Internal
use super::{
    ranging::{ping, robust_distance},
    Params, RangeSample, ScanError,
};
use crate::{
    hal::{Clock, PwmLine, ScannerIo},
    pin_arbiter::{PinArbiter, PinOwner},
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Ranging scanner module state.
pub struct Scanner {
    params: Params,
    io: ScannerIo,
    arbiter: Arc<PinArbiter>,
    clock: Arc<dyn Clock>,
}

/// Holds the shared pin for the duration of a sweep.
///
/// Dropping the session zeroes and stops the servo PWM, waits for the pin to settle and releases
/// the lease, whichever way the sweep ends.
struct ServoSession<'a> {
    servo: &'a mut Box<dyn PwmLine>,
    arbiter: &'a PinArbiter,
    clock: &'a dyn Clock,
    params: &'a Params,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Scanner {
    /// Create the scanner, driving the trigger low.
    pub fn new(
        mut io: ScannerIo,
        arbiter: Arc<PinArbiter>,
        clock: Arc<dyn Clock>,
        params: Params,
    ) -> Result<Self, ScanError> {
        if !params.are_valid() {
            return Err(ScanError::InvalidParams);
        }

        io.trig.set_low();

        Ok(Self {
            params,
            io,
            arbiter,
            clock,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Perform one full sweep.
    pub fn scan(&mut self) -> Result<Vec<RangeSample>, ScanError> {
        self.scan_until(|| false)
    }

    /// Perform one full sweep, abandoning it if `cancelled` returns true.
    ///
    /// `cancelled` is checked before each angle, so the sweep stops once the reading in progress
    /// completes. A cancelled sweep returns [`ScanError::Cancelled`] and its samples are
    /// discarded.
    pub fn scan_until<F>(&mut self, cancelled: F) -> Result<Vec<RangeSample>, ScanError>
    where
        F: Fn() -> bool,
    {
        if !self
            .arbiter
            .acquire(PinOwner::Scanner, self.params.lease_timeout())
        {
            let owner = self.arbiter.current_owner();
            warn!("Could not start scan, shared pin held by {:?}", owner);
            return Err(ScanError::PinBusy(owner));
        }

        let Self {
            params,
            io,
            arbiter,
            clock,
        } = self;
        let ScannerIo { servo, trig, echo } = io;
        let params: &Params = params;
        let clock: &dyn Clock = &**clock;

        let mut session = ServoSession {
            servo,
            arbiter: &**arbiter,
            clock,
            params,
        };
        session.start()?;

        let ranging = &params.ranging;
        let inter_ping = Duration::from_secs_f64(ranging.inter_ping_s);
        let settle = Duration::from_secs_f64(params.servo_settle_s);

        let mut last_accepted: Option<f64> = None;
        let mut samples = Vec::new();

        for angle in params.sweep_angles() {
            if cancelled() {
                info!("Scan cancelled at {:.0} deg", angle);
                return Err(ScanError::Cancelled);
            }

            session.set_angle(angle)?;
            clock.sleep(settle);

            let pings = (0..ranging.samples_per_reading).map(|_| {
                let p = ping(&mut **trig, &**echo, clock, ranging);
                clock.sleep(inter_ping);
                p
            });

            let distance = match robust_distance(pings, ranging) {
                Ok(d) => d,
                Err(e) => {
                    trace!("No reading at {:.0} deg: {}", angle, e);
                    continue;
                }
            };

            if let Some(last) = last_accepted {
                if (distance - last).abs() > params.max_jump_cm {
                    trace!(
                        "Reading of {:.1} cm at {:.0} deg rejected, jump from {:.1} cm",
                        distance,
                        angle,
                        last
                    );
                    continue;
                }
            }
            last_accepted = Some(distance);

            samples.push(RangeSample::new(angle, params.forward_servo_deg, distance));
        }

        debug!("Scan complete with {} samples", samples.len());

        Ok(samples)
    }
}

impl<'a> ServoSession<'a> {
    fn start(&mut self) -> Result<(), ScanError> {
        self.servo.start(self.params.servo_pwm_frequency_hz, 0.0)?;
        self.clock
            .sleep(Duration::from_secs_f64(self.params.servo_start_settle_s));
        Ok(())
    }

    fn set_angle(&mut self, angle_deg: f64) -> Result<(), ScanError> {
        let duty = self.params.angle_to_duty(angle_deg);
        trace!("Servo to {:.0} deg ({:.2} %)", angle_deg, duty);
        self.servo.set_duty(duty)?;
        Ok(())
    }
}

impl<'a> Drop for ServoSession<'a> {
    fn drop(&mut self) {
        if self.servo.is_running() {
            if let Err(e) = self.servo.set_duty(0.0) {
                warn!("Could not zero servo PWM: {}", e);
            }
            self.clock
                .sleep(Duration::from_secs_f64(self.params.servo_stop_delay_s));
            if let Err(e) = self.servo.stop() {
                warn!("Could not stop servo PWM: {}", e);
            }
        }

        self.clock
            .sleep(Duration::from_secs_f64(self.params.pin_settle_s));
        self.arbiter.release(PinOwner::Scanner);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::hal::sim::{SimBoard, SimClock, SimPwm};
    use std::cell::Cell;

    fn scanner(params: Params) -> (SimBoard, Arc<PinArbiter>, Scanner) {
        let clock = Arc::new(SimClock::with_tick(Duration::from_micros(2)));
        let sim = SimBoard::new(clock.clone());
        let arbiter = Arc::new(PinArbiter::new(Duration::from_millis(1)));
        let scanner = Scanner::new(sim.board().scanner, arbiter.clone(), clock, params).unwrap();
        (sim, arbiter, scanner)
    }

    fn fast_params() -> Params {
        Params {
            lease_timeout_s: 0.02,
            ..Default::default()
        }
    }

    /// Range function placing `range` at the angles in `at` and nothing elsewhere.
    fn range_at(params: &Params, at: Vec<(f64, f64)>) -> impl Fn(Option<f64>) -> Option<f64> {
        let params = params.clone();
        move |duty| {
            let angle = params.duty_to_angle(duty?);
            at.iter()
                .find(|(a, _)| (a - angle).abs() < 0.5)
                .map(|(_, r)| *r)
        }
    }

    #[test]
    fn test_full_sweep() {
        let (sim, arbiter, mut scanner) = scanner(fast_params());
        sim.set_default_range(Some(120.0));

        let samples = scanner.scan().unwrap();

        assert_eq!(samples.len(), 19);
        for (s, angle) in samples.iter().zip(scanner.params().sweep_angles()) {
            assert_eq!(s.sweep_angle_deg, angle);
            assert!((s.distance_cm - 120.0).abs() < 0.5);
        }
        assert_eq!(sim.num_pings(), 19 * 7);

        // Pin handed back and servo stopped
        assert_eq!(arbiter.current_owner(), None);
        assert!(!sim.pwm_running(SimPwm::Servo));
        assert_eq!(sim.shared_pin_conflicts(), 0);
    }

    #[test]
    fn test_missing_readings_omitted() {
        let params = fast_params();
        let (sim, _, mut scanner) = scanner(params.clone());
        sim.set_range_fn(range_at(&params, vec![(60.0, 100.0), (85.0, 110.0), (130.0, 95.0)]));

        let samples = scanner.scan().unwrap();
        let angles: Vec<f64> = samples.iter().map(|s| s.sweep_angle_deg).collect();
        assert_eq!(angles, vec![60.0, 85.0, 130.0]);
        assert_eq!(samples[1].bearing_deg, -5.0);
    }

    #[test]
    fn test_continuity_gate() {
        let params = Params {
            sweep_min_deg: 80.0,
            sweep_max_deg: 100.0,
            ..fast_params()
        };
        let (sim, _, mut scanner) = scanner(params.clone());

        // 85 jumps from 80 and is rejected, 90 is compared against 80 and accepted
        sim.set_range_fn(range_at(
            &params,
            vec![(80.0, 100.0), (85.0, 200.0), (90.0, 120.0), (95.0, 160.0), (100.0, 140.0)],
        ));

        let samples = scanner.scan().unwrap();
        let angles: Vec<f64> = samples.iter().map(|s| s.sweep_angle_deg).collect();
        assert_eq!(angles, vec![80.0, 90.0, 100.0]);

        // Gate is seeded fresh on each scan
        sim.set_range_fn(range_at(&params, vec![(85.0, 300.0)]));
        let samples = scanner.scan().unwrap();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].distance_cm - 300.0).abs() < 0.5);
    }

    #[test]
    fn test_pin_busy() {
        let (sim, arbiter, mut scanner) = scanner(fast_params());
        assert!(arbiter.acquire(PinOwner::Motors, Duration::from_millis(0)));

        assert!(matches!(
            scanner.scan(),
            Err(ScanError::PinBusy(Some(PinOwner::Motors)))
        ));
        assert!(!sim.pwm_started(SimPwm::Servo));
        assert_eq!(sim.num_pings(), 0);
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Motors));
    }

    #[test]
    fn test_cancel_releases_pin() {
        let (sim, arbiter, mut scanner) = scanner(fast_params());
        sim.set_default_range(Some(80.0));

        let checks = Cell::new(0);
        let r = scanner.scan_until(|| {
            checks.set(checks.get() + 1);
            checks.get() > 3
        });

        assert!(matches!(r, Err(ScanError::Cancelled)));
        assert_eq!(sim.num_pings(), 3 * 7);
        assert_eq!(arbiter.current_owner(), None);
        assert!(!sim.pwm_running(SimPwm::Servo));
    }

    #[test]
    fn test_servo_duty_commanded() {
        let params = Params {
            sweep_min_deg: 90.0,
            sweep_max_deg: 90.0,
            angle_offset_deg: 9.0,
            ..fast_params()
        };
        let (sim, _, mut scanner) = scanner(params);
        sim.set_default_range(Some(50.0));

        scanner.scan().unwrap();

        assert!(sim
            .events()
            .iter()
            .any(|e| *e == crate::hal::sim::SimEvent::PwmDuty(SimPwm::Servo, 8.0)));
    }
}
