// Simulated DC motor with a quadrature counter
//
// Stands in for the encoder timer and PWM bridge when no board is attached.
// Speed follows the applied duty instantly (no inertia) and the position is
// integrated whenever either half of the motor is touched.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::controller::Clock;
use super::driver::{Channel, PwmOutput};
use super::encoder::CounterSource;
use crate::config::COUNTER_MODULUS;

/// Clock advanced by hand; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

struct Plant {
    counts_per_ms: f64,
    enabled: bool,
    forward: f32,
    reverse: f32,
    // Shaft position in counts, forward positive
    shaft: f64,
    last_ms: u64,
}

impl Plant {
    fn advance(&mut self, now_ms: u64) {
        let dt = now_ms.saturating_sub(self.last_ms) as f64;
        self.last_ms = now_ms;
        if !self.enabled {
            return;
        }
        // The bridge output saturates at a full period
        let forward = f64::from(self.forward.clamp(0.0, 100.0));
        let reverse = f64::from(self.reverse.clamp(0.0, 100.0));
        self.shaft += (forward - reverse) / 100.0 * self.counts_per_ms * dt;
    }

    fn raw(&self) -> u16 {
        // Forward rotation makes the timer count down
        (-(self.shaft.round() as i64)).rem_euclid(i64::from(COUNTER_MODULUS)) as u16
    }
}

/// One simulated motor; split it into its counter and bridge halves
pub struct SimMotor<C: Clock> {
    plant: Rc<RefCell<Plant>>,
    clock: C,
}

impl<C: Clock + Clone> SimMotor<C> {
    pub fn new(counts_per_ms: f64, clock: C) -> Self {
        let last_ms = clock.now_ms();
        Self {
            plant: Rc::new(RefCell::new(Plant {
                counts_per_ms,
                enabled: false,
                forward: 0.0,
                reverse: 0.0,
                shaft: 0.0,
                last_ms,
            })),
            clock,
        }
    }

    pub fn split(&self) -> (SimCounter<C>, SimBridge<C>) {
        (
            SimCounter {
                plant: Rc::clone(&self.plant),
                clock: self.clock.clone(),
            },
            SimBridge {
                plant: Rc::clone(&self.plant),
                clock: self.clock.clone(),
            },
        )
    }

    /// Shaft position in counts, forward positive
    pub fn shaft(&self) -> f64 {
        let mut plant = self.plant.borrow_mut();
        plant.advance(self.clock.now_ms());
        plant.shaft
    }
}

pub struct SimCounter<C: Clock> {
    plant: Rc<RefCell<Plant>>,
    clock: C,
}

impl<C: Clock> CounterSource for SimCounter<C> {
    fn count(&mut self) -> u16 {
        let mut plant = self.plant.borrow_mut();
        plant.advance(self.clock.now_ms());
        plant.raw()
    }
}

pub struct SimBridge<C: Clock> {
    plant: Rc<RefCell<Plant>>,
    clock: C,
}

impl<C: Clock> PwmOutput for SimBridge<C> {
    fn enable(&mut self) {
        let mut plant = self.plant.borrow_mut();
        plant.advance(self.clock.now_ms());
        plant.enabled = true;
    }

    fn set_percent(&mut self, channel: Channel, percent: f32) {
        let mut plant = self.plant.borrow_mut();
        plant.advance(self.clock.now_ms());
        match channel {
            Channel::Forward => plant.forward = percent,
            Channel::Reverse => plant.reverse = percent,
        }
    }
}
