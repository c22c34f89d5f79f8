//! Implementations for the Motors state structure

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, info, warn};
use serde::Serialize;

// Internal
use super::{
    logical_to_physical, physical_duties, side_duties, Direction, Manoeuvre, MotorError, Params,
    PhysicalBits, Sides,
};
use crate::{
    hal::{Clock, Level, MotorIo, PwmLine},
    pin_arbiter::{PinArbiter, PinOwner},
};
use util::maths::clamp;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Motor control module state.
///
/// All operations are serialised by an internal lock, so a `Motors` may be shared between threads.
pub struct Motors {
    params: Params,
    arbiter: Arc<PinArbiter>,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

/// State of one logical motor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MotorChannel {
    pub direction: Direction,
    pub duty_pct: f64,
    pub enabled: bool,
}

struct Inner {
    io: MotorIo,
    speed_pct: u8,
    enabled: bool,
    channels: Sides<MotorChannel>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for MotorChannel {
    fn default() -> Self {
        Self {
            direction: Direction::Coast,
            duty_pct: 0.0,
            enabled: false,
        }
    }
}

impl Motors {
    /// Create the motors, driving every output low.
    pub fn new(
        mut io: MotorIo,
        arbiter: Arc<PinArbiter>,
        clock: Arc<dyn Clock>,
        params: Params,
    ) -> Result<Self, MotorError> {
        if !params.are_valid() {
            return Err(MotorError::InvalidParams);
        }

        io.stby.set_low();
        io.ain1.set_low();
        io.ain2.set_low();
        io.bin1.set_low();
        io.bin2.set_low();

        debug!("Motor outputs initialised low");

        Ok(Self {
            inner: Mutex::new(Inner {
                io,
                speed_pct: params.default_speed_pct,
                enabled: false,
                channels: Sides::both(MotorChannel::default()),
            }),
            params,
            arbiter,
            clock,
        })
    }

    /// Enable the driver and start both PWM outputs at zero duty.
    ///
    /// Requires the shared pin lease, waiting up to the configured timeout for it. Enabling
    /// already enabled motors does nothing.
    pub fn enable(&self) -> Result<(), MotorError> {
        if !self
            .arbiter
            .acquire(PinOwner::Motors, self.params.lease_timeout())
        {
            let owner = self.arbiter.current_owner();
            warn!("Could not enable motors, shared pin held by {:?}", owner);
            return Err(MotorError::PinBusy(owner));
        }

        let mut inner = self.lock();
        if inner.enabled {
            return Ok(());
        }

        inner.set_directions(Sides::both(Direction::Coast), &self.params);
        inner.io.stby.set_high();

        if let Err(e) = inner.start_pwm(self.params.pwm_frequency_hz) {
            warn!("Failed to start motor PWM: {}", e);
            inner.shutdown_outputs(&*self.clock, self.params.pwm_stop_delay());
            drop(inner);
            self.arbiter.release(PinOwner::Motors);
            return Err(e.into());
        }

        inner.enabled = true;
        inner.channels.left.enabled = true;
        inner.channels.right.enabled = true;

        info!("Motors enabled");

        Ok(())
    }

    /// Zero and stop both PWM outputs, put the driver in standby and release the shared pin.
    ///
    /// Returns once the pin has been left idle for the settle time. Hardware errors are logged
    /// and otherwise ignored, the outputs are always left safe.
    pub fn disable(&self) {
        {
            let mut inner = self.lock();
            inner.shutdown_outputs(&*self.clock, self.params.pwm_stop_delay());

            if inner.enabled {
                info!("Motors disabled");
            }
            inner.enabled = false;
        }

        self.arbiter.release(PinOwner::Motors);
        self.clock.sleep(self.params.pin_settle());
    }

    /// Set the speed of both motors.
    ///
    /// The speed is clamped to 0..=100 % and kept for subsequent manoeuvres. If the motors are
    /// enabled the new speed is applied immediately.
    pub fn set_speed(&self, speed_pct: i64) -> Result<(), MotorError> {
        let speed = clamp(speed_pct, 0, 100) as u8;
        let mut inner = self.lock();
        inner.speed_pct = speed;
        inner.apply_speed(speed, &self.params)?;

        debug!("Motor speed set to {} %", speed);

        Ok(())
    }

    pub fn forward(&self, speed_pct: Option<i64>) -> Result<(), MotorError> {
        self.drive(Manoeuvre::Forward, speed_pct)
    }

    pub fn back(&self, speed_pct: Option<i64>) -> Result<(), MotorError> {
        self.drive(Manoeuvre::Back, speed_pct)
    }

    /// Turn left in place.
    pub fn left(&self, speed_pct: Option<i64>) -> Result<(), MotorError> {
        self.drive(Manoeuvre::Left, speed_pct)
    }

    /// Turn right in place.
    pub fn right(&self, speed_pct: Option<i64>) -> Result<(), MotorError> {
        self.drive(Manoeuvre::Right, speed_pct)
    }

    /// Perform a manoeuvre, optionally setting a new speed first.
    ///
    /// The motors must already be enabled.
    pub fn drive(&self, mnvr: Manoeuvre, speed_pct: Option<i64>) -> Result<(), MotorError> {
        if let Some(s) = speed_pct {
            self.set_speed(s)?;
        }

        let mut inner = self.lock();
        if !inner.enabled {
            return Err(MotorError::NotEnabled);
        }

        inner.io.stby.set_high();
        inner.set_directions(mnvr.side_directions(), &self.params);
        let speed = inner.speed_pct;
        inner.apply_speed(speed, &self.params)?;

        debug!("Motors driving {:?} at {} %", mnvr, speed);

        Ok(())
    }

    /// Let the motors spin freely, with zero duty.
    pub fn coast(&self) -> Result<(), MotorError> {
        self.hold(Direction::Coast)
    }

    /// Short the motors to brake them, with zero duty.
    pub fn brake(&self) -> Result<(), MotorError> {
        self.hold(Direction::Brake)
    }

    pub fn stop(&self, brake: bool) -> Result<(), MotorError> {
        if brake {
            self.brake()
        } else {
            self.coast()
        }
    }

    /// Coast and disable, ignoring any errors.
    pub fn cleanup(&self) {
        if let Err(e) = self.stop(false) {
            warn!("Error stopping motors during cleanup: {}", e);
        }
        self.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// The stored speed.
    pub fn speed_pct(&self) -> u8 {
        self.lock().speed_pct
    }

    pub fn channels(&self) -> Sides<MotorChannel> {
        self.lock().channels
    }

    fn hold(&self, direction: Direction) -> Result<(), MotorError> {
        let mut inner = self.lock();
        inner.set_directions(Sides::both(direction), &self.params);
        inner.apply_speed(0, &self.params)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Inner {
    fn set_directions(&mut self, dirs: Sides<Direction>, params: &Params) {
        let PhysicalBits {
            ain1,
            ain2,
            bin1,
            bin2,
        } = logical_to_physical(dirs, &params.calibration);

        self.io.ain1.set(Level::from_bool(ain1));
        self.io.ain2.set(Level::from_bool(ain2));
        self.io.bin1.set(Level::from_bool(bin1));
        self.io.bin2.set(Level::from_bool(bin2));

        self.channels.left.direction = dirs.left;
        self.channels.right.direction = dirs.right;
    }

    /// Apply the trimmed speed to whichever PWM outputs are running.
    fn apply_speed(&mut self, speed_pct: u8, params: &Params) -> Result<(), MotorError> {
        let duties = side_duties(speed_pct, &params.calibration);
        let (a, b) = physical_duties(duties, &params.calibration);

        if self.io.pwm_a.is_running() {
            self.io.pwm_a.set_duty(a)?;
        }
        if self.io.pwm_b.is_running() {
            self.io.pwm_b.set_duty(b)?;
        }

        if self.enabled {
            self.channels.left.duty_pct = duties.left;
            self.channels.right.duty_pct = duties.right;
        }

        Ok(())
    }

    fn start_pwm(&mut self, frequency_hz: f64) -> Result<(), crate::hal::HalError> {
        if !self.io.pwm_a.is_running() {
            self.io.pwm_a.start(frequency_hz, 0.0)?;
        }
        if !self.io.pwm_b.is_running() {
            self.io.pwm_b.start(frequency_hz, 0.0)?;
        }
        Ok(())
    }

    /// Stop both PWM outputs, set the direction inputs to coast and put the driver in standby.
    fn shutdown_outputs(&mut self, clock: &dyn Clock, stop_delay: Duration) {
        stop_pwm(&mut self.io.pwm_a, clock, stop_delay);
        stop_pwm(&mut self.io.pwm_b, clock, stop_delay);

        self.io.ain1.set_low();
        self.io.ain2.set_low();
        self.io.bin1.set_low();
        self.io.bin2.set_low();
        self.io.stby.set_low();

        self.channels = Sides::both(MotorChannel::default());
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Ramp a PWM output to zero and stop it, if it's running.
fn stop_pwm(pwm: &mut Box<dyn PwmLine>, clock: &dyn Clock, stop_delay: Duration) {
    if !pwm.is_running() {
        return;
    }

    if let Err(e) = pwm.set_duty(0.0) {
        warn!("Could not zero motor PWM before stopping: {}", e);
    }
    clock.sleep(stop_delay);
    if let Err(e) = pwm.stop() {
        warn!("Could not stop motor PWM: {}", e);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        hal::sim::{SimBoard, SimClock, SimEvent, SimPin, SimPwm},
        motor_ctrl::MotorCalibration,
    };

    fn motors(params: Params) -> (SimBoard, Arc<PinArbiter>, Motors) {
        let clock = Arc::new(SimClock::new());
        let sim = SimBoard::new(clock.clone());
        let arbiter = Arc::new(PinArbiter::new(Duration::from_millis(1)));
        let motors = Motors::new(sim.board().motors, arbiter.clone(), clock, params).unwrap();
        (sim, arbiter, motors)
    }

    fn fast_params() -> Params {
        Params {
            lease_timeout_s: 0.02,
            ..Default::default()
        }
    }

    #[test]
    fn test_setup_and_enable() {
        let (sim, arbiter, motors) = motors(fast_params());

        assert_eq!(sim.level(SimPin::Stby), Level::Low);
        assert!(!motors.is_enabled());
        assert_eq!(motors.speed_pct(), 60);

        motors.enable().unwrap();
        assert!(motors.is_enabled());
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Motors));
        assert_eq!(sim.level(SimPin::Stby), Level::High);
        assert_eq!(sim.duty(SimPwm::MotorA), Some(0.0));
        assert_eq!(sim.duty(SimPwm::MotorB), Some(0.0));
        assert_eq!(sim.frequency(SimPwm::MotorA), Some(1000.0));
        assert_eq!(motors.channels().left.direction, Direction::Coast);

        // Idempotent
        sim.clear_events();
        motors.enable().unwrap();
        assert!(sim.events().is_empty());
    }

    #[test]
    fn test_enable_pin_busy() {
        let (sim, arbiter, motors) = motors(fast_params());

        assert!(arbiter.acquire(PinOwner::Scanner, Duration::from_millis(0)));
        sim.clear_events();

        match motors.enable() {
            Err(MotorError::PinBusy(Some(PinOwner::Scanner))) => (),
            r => panic!("Expected PinBusy, got {:?}", r),
        }
        assert!(!motors.is_enabled());
        assert!(sim.events().is_empty());
        assert_eq!(arbiter.current_owner(), Some(PinOwner::Scanner));
    }

    #[test]
    fn test_set_speed_clamps() {
        let (_, _, motors) = motors(fast_params());

        for &(demand, stored) in &[(-20, 0), (0, 0), (45, 45), (100, 100), (250, 100)] {
            motors.set_speed(demand).unwrap();
            assert_eq!(motors.speed_pct(), stored);
        }
    }

    #[test]
    fn test_drive_with_calibration() {
        let (sim, _, motors) = motors(Params {
            calibration: MotorCalibration {
                left_trim: 0.5,
                right_trim: 1.0,
                swap_sides: true,
                ..Default::default()
            },
            ..fast_params()
        });

        motors.enable().unwrap();
        motors.forward(Some(80)).unwrap();

        // Left side is on channel B
        assert_eq!(sim.duty(SimPwm::MotorA), Some(80.0));
        assert_eq!(sim.duty(SimPwm::MotorB), Some(40.0));
        assert_eq!(sim.level(SimPin::Ain1), Level::High);
        assert_eq!(sim.level(SimPin::Ain2), Level::Low);
        assert_eq!(sim.level(SimPin::Bin1), Level::High);

        motors.left(None).unwrap();
        let ch = motors.channels();
        assert_eq!(ch.left.direction, Direction::Backward);
        assert_eq!(ch.right.direction, Direction::Forward);
        assert_eq!(ch.left.duty_pct, 40.0);
        // Right side forward on channel A, left side backward on channel B
        assert_eq!(sim.level(SimPin::Ain1), Level::High);
        assert_eq!(sim.level(SimPin::Bin1), Level::Low);
        assert_eq!(sim.level(SimPin::Bin2), Level::High);

        motors.brake().unwrap();
        assert_eq!(sim.duty(SimPwm::MotorA), Some(0.0));
        for pin in &[SimPin::Ain1, SimPin::Ain2, SimPin::Bin1, SimPin::Bin2] {
            assert_eq!(sim.level(*pin), Level::High);
        }

        motors.stop(false).unwrap();
        for pin in &[SimPin::Ain1, SimPin::Ain2, SimPin::Bin1, SimPin::Bin2] {
            assert_eq!(sim.level(*pin), Level::Low);
        }
    }

    #[test]
    fn test_drive_requires_enable() {
        let (sim, _, motors) = motors(fast_params());

        assert!(matches!(motors.back(None), Err(MotorError::NotEnabled)));
        assert_eq!(sim.level(SimPin::Stby), Level::Low);

        // Speed is still stored
        assert!(matches!(motors.right(Some(30)), Err(MotorError::NotEnabled)));
        assert_eq!(motors.speed_pct(), 30);
    }

    #[test]
    fn test_disable() {
        let (sim, arbiter, motors) = motors(fast_params());

        motors.enable().unwrap();
        motors.forward(None).unwrap();
        sim.clear_events();

        motors.disable();

        assert!(!motors.is_enabled());
        assert_eq!(arbiter.current_owner(), None);
        assert!(!sim.pwm_running(SimPwm::MotorA));
        assert!(!sim.pwm_running(SimPwm::MotorB));
        assert_eq!(sim.level(SimPin::Stby), Level::Low);
        assert_eq!(motors.channels(), Sides::both(MotorChannel::default()));

        // Duty zeroed before the stop
        let events = sim.events();
        let zero = events
            .iter()
            .position(|e| *e == SimEvent::PwmDuty(SimPwm::MotorA, 0.0))
            .unwrap();
        let stop = events
            .iter()
            .position(|e| *e == SimEvent::PwmStop(SimPwm::MotorA))
            .unwrap();
        assert!(zero < stop);

        // Disabling again is harmless
        motors.disable();
        assert_eq!(arbiter.current_owner(), None);
    }

    #[test]
    fn test_cleanup() {
        let (sim, arbiter, motors) = motors(fast_params());

        motors.enable().unwrap();
        motors.forward(None).unwrap();
        motors.cleanup();

        assert!(!motors.is_enabled());
        assert_eq!(arbiter.current_owner(), None);
        assert_eq!(sim.level(SimPin::Ain1), Level::Low);
        assert_eq!(sim.shared_pin_conflicts(), 0);
    }

    #[test]
    fn test_invalid_params() {
        let clock = Arc::new(SimClock::new());
        let sim = SimBoard::new(clock.clone());
        let mut params = Params::default();
        params.pwm_frequency_hz = 0.0;

        assert!(matches!(
            Motors::new(sim.board().motors, Arc::new(PinArbiter::default()), clock, params),
            Err(MotorError::InvalidParams)
        ));
    }
}
