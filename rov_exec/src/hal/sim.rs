//! # Simulated hardware
//!
//! [`SimBoard`] stands in for the rover's GPIO when running off-target or under test. It records
//! every call made through its lines, tracks pin levels and PWM state, counts how often both
//! users of the shared pin were driving it at once, and simulates the ultrasonic sensor's echo.
//!
//! The echo is produced from the range "seen" by the sensor at the moment the trigger pulse falls.
//! Ranges are taken, in order of preference, from a queue of scripted ranges, from a function of
//! the servo duty cycle, or from a default range. A range of `None` means the echo never rises.
//!
//! [`SimClock`] is a virtual clock. Sleeping advances it instantly and every read of the time
//! advances it by a small tick, so polling loops make progress without any real time passing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use serde::Serialize;

use super::{
    check_duty, check_pwm_demand, Board, Clock, HalError, InputLine, Level, MotorIo, OutputLine,
    PwmLine, ScannerIo,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Half the speed of sound in cm/s, used to turn a range into an echo pulse width.
const HALF_SPEED_OF_SOUND_CM_S: f64 = 17_150.0;

/// Delay between the trigger falling and the echo rising.
const ECHO_RISE_DELAY: Duration = Duration::from_micros(450);

/// Default number of events kept by a [`SimBoard`].
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 10_000;

/// Default amount the [`SimClock`] advances on each read.
const DEFAULT_TICK: Duration = Duration::from_micros(1);

// ------------------------------------------------------------------------------------------------
// TYPES
// ------------------------------------------------------------------------------------------------

/// Function giving the range seen by the sensor for a given servo duty cycle, or `None` if the
/// servo PWM isn't running.
pub type RangeFn = Box<dyn Fn(Option<f64>) -> Option<f64> + Send>;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Virtual clock for simulation and tests.
pub struct SimClock {
    now_ns: AtomicU64,
    tick_ns: u64,
}

/// A simulated board.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct SimBoard {
    state: Arc<Mutex<SimState>>,
    clock: Arc<dyn Clock>,
}

struct SimState {
    levels: HashMap<SimPin, Level>,
    pwm: HashMap<SimPwm, PwmState>,
    events: VecDeque<SimEvent>,
    event_log_capacity: usize,
    shared_pin_conflicts: u32,

    scripted_ranges: VecDeque<Option<f64>>,
    range_fn: Option<RangeFn>,
    default_range: Option<f64>,

    echo: Option<EchoWindow>,
    num_pings: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct PwmState {
    running: bool,
    frequency_hz: f64,
    duty_pct: f64,
}

/// Interval during which the echo line is high.
#[derive(Debug, Clone, Copy)]
struct EchoWindow {
    rise: Duration,
    fall: Duration,
}

struct SimOutput {
    board: SimBoard,
    pin: SimPin,
}

struct SimInput {
    board: SimBoard,
}

struct SimPwmLine {
    board: SimBoard,
    line: SimPwm,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Digital outputs on the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SimPin {
    Stby,
    Ain1,
    Ain2,
    Bin1,
    Bin2,
    Trig,
}

/// PWM outputs on the simulated board.
///
/// `MotorA` and `Servo` are the two users of the shared pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SimPwm {
    MotorA,
    MotorB,
    Servo,
}

/// A call made on the simulated board.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum SimEvent {
    Set(SimPin, Level),
    PwmStart(SimPwm, f64, f64),
    PwmDuty(SimPwm, f64),
    PwmStop(SimPwm),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimClock {
    pub fn new() -> Self {
        Self::with_tick(DEFAULT_TICK)
    }

    /// Create a clock which advances by `tick` each time it is read.
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            now_ns: AtomicU64::new(0),
            tick_ns: tick.as_nanos() as u64,
        }
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns.fetch_add(self.tick_ns, Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        self.now_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl SimBoard {
    /// Create a board keeping the last [`DEFAULT_EVENT_LOG_CAPACITY`] events.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_event_log_capacity(clock, DEFAULT_EVENT_LOG_CAPACITY)
    }

    /// Create a board keeping only the last `capacity` events, older ones are dropped. A capacity
    /// of zero disables the event log.
    pub fn with_event_log_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                levels: HashMap::new(),
                pwm: HashMap::new(),
                events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_LOG_CAPACITY)),
                event_log_capacity: capacity,
                shared_pin_conflicts: 0,
                scripted_ranges: VecDeque::new(),
                range_fn: None,
                default_range: None,
                echo: None,
                num_pings: 0,
            })),
            clock,
        }
    }

    /// Build the [`Board`] handed to the rover, with every line backed by this simulation.
    pub fn board(&self) -> Board {
        let output = |pin| -> Box<dyn OutputLine> {
            Box::new(SimOutput {
                board: self.clone(),
                pin,
            })
        };
        let pwm = |line| -> Box<dyn PwmLine> {
            Box::new(SimPwmLine {
                board: self.clone(),
                line,
            })
        };

        Board {
            motors: MotorIo {
                stby: output(SimPin::Stby),
                ain1: output(SimPin::Ain1),
                ain2: output(SimPin::Ain2),
                bin1: output(SimPin::Bin1),
                bin2: output(SimPin::Bin2),
                pwm_a: pwm(SimPwm::MotorA),
                pwm_b: pwm(SimPwm::MotorB),
            },
            scanner: ScannerIo {
                servo: pwm(SimPwm::Servo),
                trig: output(SimPin::Trig),
                echo: Box::new(SimInput {
                    board: self.clone(),
                }),
            },
        }
    }

    // ---- ENVIRONMENT ----

    /// Queue ranges to be returned by the next pings, in order.
    pub fn push_ranges<I: IntoIterator<Item = Option<f64>>>(&self, ranges: I) {
        self.lock().scripted_ranges.extend(ranges);
    }

    /// Set the function used to get the range once the scripted ranges are exhausted.
    pub fn set_range_fn<F>(&self, f: F)
    where
        F: Fn(Option<f64>) -> Option<f64> + Send + 'static,
    {
        self.lock().range_fn = Some(Box::new(f));
    }

    /// Set the range used when there are no scripted ranges and no range function.
    pub fn set_default_range(&self, range_cm: Option<f64>) {
        self.lock().default_range = range_cm;
    }

    // ---- INSPECTION ----

    pub fn level(&self, pin: SimPin) -> Level {
        self.lock().levels.get(&pin).copied().unwrap_or(Level::Low)
    }

    pub fn pwm_running(&self, line: SimPwm) -> bool {
        self.lock().pwm.get(&line).map(|p| p.running).unwrap_or(false)
    }

    /// Current duty cycle of a PWM line, or `None` if it isn't running.
    pub fn duty(&self, line: SimPwm) -> Option<f64> {
        self.lock()
            .pwm
            .get(&line)
            .filter(|p| p.running)
            .map(|p| p.duty_pct)
    }

    pub fn frequency(&self, line: SimPwm) -> Option<f64> {
        self.lock()
            .pwm
            .get(&line)
            .filter(|p| p.running)
            .map(|p| p.frequency_hz)
    }

    /// Number of times one user of the shared pin started PWM while the other was running.
    pub fn shared_pin_conflicts(&self) -> u32 {
        self.lock().shared_pin_conflicts
    }

    pub fn num_pings(&self) -> u64 {
        self.lock().num_pings
    }

    /// The most recent events, oldest first.
    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.iter().copied().collect()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear()
    }

    /// True if any PWM was started on the given line since the events were last cleared.
    pub fn pwm_started(&self, line: SimPwm) -> bool {
        self.lock()
            .events
            .iter()
            .any(|e| matches!(e, SimEvent::PwmStart(l, _, _) if *l == line))
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SimState {
    fn record(&mut self, event: SimEvent) {
        if self.event_log_capacity == 0 {
            return;
        }
        if self.events.len() >= self.event_log_capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn servo_duty(&self) -> Option<f64> {
        self.pwm
            .get(&SimPwm::Servo)
            .filter(|p| p.running)
            .map(|p| p.duty_pct)
    }

    fn next_range(&mut self) -> Option<f64> {
        if let Some(r) = self.scripted_ranges.pop_front() {
            return r;
        }

        match self.range_fn {
            Some(ref f) => f(self.servo_duty()),
            None => self.default_range,
        }
    }
}

impl OutputLine for SimOutput {
    fn set(&mut self, level: Level) {
        let now = self.board.clock.now();
        let mut state = self.board.lock();

        let prev = state.levels.insert(self.pin, level).unwrap_or(Level::Low);
        state.record(SimEvent::Set(self.pin, level));

        // A falling trigger fires a ping
        if self.pin == SimPin::Trig && prev == Level::High && level == Level::Low {
            state.num_pings += 1;
            state.echo = state.next_range().map(|range_cm| {
                let rise = now + ECHO_RISE_DELAY;
                EchoWindow {
                    rise,
                    fall: rise + Duration::from_secs_f64(range_cm.max(0.0) / HALF_SPEED_OF_SOUND_CM_S),
                }
            });
        }
    }
}

impl InputLine for SimInput {
    fn read(&self) -> Level {
        let now = self.board.clock.now();
        let state = self.board.lock();

        match state.echo {
            Some(w) => Level::from_bool(now >= w.rise && now < w.fall),
            None => Level::Low,
        }
    }
}

impl SimPwmLine {
    fn other_shared_user(&self) -> Option<SimPwm> {
        match self.line {
            SimPwm::MotorA => Some(SimPwm::Servo),
            SimPwm::Servo => Some(SimPwm::MotorA),
            SimPwm::MotorB => None,
        }
    }
}

impl PwmLine for SimPwmLine {
    fn start(&mut self, frequency_hz: f64, duty_pct: f64) -> Result<(), HalError> {
        check_pwm_demand(frequency_hz, duty_pct)?;

        let other = self.other_shared_user();
        let mut state = self.board.lock();

        if let Some(other) = other {
            if state.pwm.get(&other).map(|p| p.running).unwrap_or(false) {
                state.shared_pin_conflicts += 1;
            }
        }

        state.pwm.insert(
            self.line,
            PwmState {
                running: true,
                frequency_hz,
                duty_pct,
            },
        );
        state.record(SimEvent::PwmStart(self.line, frequency_hz, duty_pct));

        Ok(())
    }

    fn set_duty(&mut self, duty_pct: f64) -> Result<(), HalError> {
        check_duty(duty_pct)?;

        let mut state = self.board.lock();
        match state.pwm.get_mut(&self.line) {
            Some(p) if p.running => p.duty_pct = duty_pct,
            _ => return Err(HalError::PwmNotRunning),
        }
        state.record(SimEvent::PwmDuty(self.line, duty_pct));

        Ok(())
    }

    fn stop(&mut self) -> Result<(), HalError> {
        let mut state = self.board.lock();
        state.pwm.insert(self.line, PwmState::default());
        state.record(SimEvent::PwmStop(self.line));

        Ok(())
    }

    fn is_running(&self) -> bool {
        self.board.pwm_running(self.line)
    }
}
