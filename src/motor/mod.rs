// Motor control module
//
// Provides:
// - Quadrature position tracking with counter wraparound
// - Two-channel PWM motor driver
// - Proportional position controller
// - Simulated motor for running without a board

pub mod controller;
pub mod driver;
pub mod encoder;
pub mod sim;

pub use controller::{
    Clock, ControllerState, MonotonicClock, PositionController, Reading, StepOutcome,
};
pub use driver::{ActuatorDriver, Channel, DutyPair, PwmOutput};
pub use encoder::{CounterSource, PositionTracker, unwrap_delta};
pub use sim::{ManualClock, SimMotor};
