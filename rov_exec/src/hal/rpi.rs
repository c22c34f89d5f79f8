//! # Raspberry Pi GPIO
//!
//! Implements the HAL traits on top of `rppal`. PWM outputs use `rppal`'s software PWM so that any
//! BCM pin can be used. The shared pin is opened once and handed to both its users behind a mutex.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use rppal::gpio::{Gpio, InputPin, OutputPin};

use super::{
    check_duty, check_pwm_demand, Board, HalError, InputLine, Level, MotorIo, OutputLine,
    PwmLine, ScannerIo,
};
use crate::params::PinParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

struct RpiOutput(OutputPin);

struct RpiInput(InputPin);

struct RpiPwm {
    pin: Arc<Mutex<OutputPin>>,
    frequency_hz: f64,
    running: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<rppal::gpio::Error> for HalError {
    fn from(e: rppal::gpio::Error) -> Self {
        HalError::Gpio(e.to_string())
    }
}

impl OutputLine for RpiOutput {
    fn set(&mut self, level: Level) {
        match level {
            Level::High => self.0.set_high(),
            Level::Low => self.0.set_low(),
        }
    }
}

impl InputLine for RpiInput {
    fn read(&self) -> Level {
        Level::from_bool(self.0.is_high())
    }
}

impl RpiPwm {
    fn new(pin: Arc<Mutex<OutputPin>>) -> Self {
        Self {
            pin,
            frequency_hz: 0.0,
            running: false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OutputPin> {
        match self.pin.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PwmLine for RpiPwm {
    fn start(&mut self, frequency_hz: f64, duty_pct: f64) -> Result<(), HalError> {
        check_pwm_demand(frequency_hz, duty_pct)?;

        self.lock()
            .set_pwm_frequency(frequency_hz, duty_pct / 100.0)?;
        self.frequency_hz = frequency_hz;
        self.running = true;

        Ok(())
    }

    fn set_duty(&mut self, duty_pct: f64) -> Result<(), HalError> {
        check_duty(duty_pct)?;
        if !self.running {
            return Err(HalError::PwmNotRunning);
        }

        self.lock()
            .set_pwm_frequency(self.frequency_hz, duty_pct / 100.0)?;

        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        let mut pin = self.lock();
        pin.clear_pwm()?;
        pin.set_low();
        self.running = false;

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Open all GPIO lines used by the rover.
pub fn init(pins: &PinParams) -> Result<Board, HalError> {
    let gpio = Gpio::new()?;

    let output = |bcm: u8| -> Result<Box<dyn OutputLine>, HalError> {
        Ok(Box::new(RpiOutput(gpio.get(bcm)?.into_output_low())))
    };
    let shared = |bcm: u8| -> Result<Arc<Mutex<OutputPin>>, HalError> {
        Ok(Arc::new(Mutex::new(gpio.get(bcm)?.into_output_low())))
    };

    let pwm_a_pin = shared(pins.left_pwm)?;
    let servo_pin = if pins.servo == pins.left_pwm {
        debug!("Servo shares BCM {} with the left motor PWM", pins.servo);
        pwm_a_pin.clone()
    } else {
        shared(pins.servo)?
    };

    Ok(Board {
        motors: MotorIo {
            stby: output(pins.stby)?,
            ain1: output(pins.ain1)?,
            ain2: output(pins.ain2)?,
            bin1: output(pins.bin1)?,
            bin2: output(pins.bin2)?,
            pwm_a: Box::new(RpiPwm::new(pwm_a_pin)),
            pwm_b: Box::new(RpiPwm::new(shared(pins.right_pwm)?)),
        },
        scanner: ScannerIo {
            servo: Box::new(RpiPwm::new(servo_pin)),
            trig: output(pins.sonar_trig)?,
            echo: Box::new(RpiInput(gpio.get(pins.sonar_echo)?.into_input())),
        },
    })
}
