// Proportional position controller
//
// Reads the encoder, computes gain * (setpoint - position) and sends it to the
// motor driver, at most once per MIN_STEP_INTERVAL_MS.

use std::time::Instant;
use tracing::{debug, info};

use super::driver::{ActuatorDriver, PwmOutput};
use super::encoder::{CounterSource, PositionTracker};
use crate::config::MIN_STEP_INTERVAL_MS;
use crate::messages::ConfigMessage;

/// Monotonic millisecond time source
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall clock measured from its creation
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Constructed, no update performed yet
    Idle,
    /// At least one update performed
    Active,
}

/// Data produced by one successful update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Sum of all intervals between updates since construction (ms)
    pub elapsed_ms: u64,
    /// Encoder position after the update (counts)
    pub position: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Called again too soon; nothing was read or written
    NoUpdate,
    Updated(Reading),
}

/// Closed position loop over one encoder and one motor
pub struct PositionController<E: CounterSource, P: PwmOutput, C: Clock> {
    tracker: PositionTracker<E>,
    driver: ActuatorDriver<P>,
    clock: C,
    gain: f32,
    setpoint: i64,
    last_update_ms: u64,
    cumulative_elapsed_ms: u64,
    state: ControllerState,
}

impl<E: CounterSource, P: PwmOutput, C: Clock> PositionController<E, P, C> {
    pub fn new(
        config: ConfigMessage,
        tracker: PositionTracker<E>,
        driver: ActuatorDriver<P>,
        clock: C,
    ) -> Self {
        info!(
            "Creating controller with gain {} and setpoint {}",
            config.gain, config.setpoint
        );
        let last_update_ms = clock.now_ms();
        Self {
            tracker,
            driver,
            clock,
            gain: config.gain,
            setpoint: config.setpoint,
            last_update_ms,
            cumulative_elapsed_ms: 0,
            state: ControllerState::Idle,
        }
    }

    /// Run one control update if enough time has passed since the last one
    ///
    /// Never blocks. There is no output saturation: whatever the proportional
    /// law yields goes to the driver.
    pub fn step(&mut self) -> StepOutcome {
        let now = self.clock.now_ms();
        let delta = now.saturating_sub(self.last_update_ms);
        if delta < MIN_STEP_INTERVAL_MS {
            return StepOutcome::NoUpdate;
        }

        self.tracker.read();
        let position = self.tracker.position();
        // Error in f64: wide enough for any setpoint without overflow
        let error = self.setpoint as f64 - position as f64;
        let output = (f64::from(self.gain) * error) as f32;
        self.driver.set_duty_cycle(output);

        self.last_update_ms = now;
        self.cumulative_elapsed_ms += delta;
        self.state = ControllerState::Active;

        debug!(
            "Step: dt={}ms position={} output={}",
            delta, position, output
        );

        StepOutcome::Updated(Reading {
            elapsed_ms: self.cumulative_elapsed_ms,
            position,
        })
    }

    pub fn set_setpoint(&mut self, setpoint: i64) {
        self.setpoint = setpoint;
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    /// Release the motor; used on operator abort
    pub fn shutdown(&mut self) {
        self.driver.stop();
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn setpoint(&self) -> i64 {
        self.setpoint
    }

    pub fn position(&self) -> i64 {
        self.tracker.position()
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn last_update_ms(&self) -> u64 {
        self.last_update_ms
    }

    pub fn driver(&self) -> &ActuatorDriver<P> {
        &self.driver
    }

    pub fn tracker_mut(&mut self) -> &mut PositionTracker<E> {
        &mut self.tracker
    }
}
