// Quadrature position tracking
//
// The encoder timer counts modulo 2^16. Consecutive samples are unwrapped into
// an unbounded signed position, assuming less than half a revolution of the
// counter between two reads.

use tracing::trace;

use crate::config::{COUNTER_MODULUS, HALF_RANGE};

/// Hardware counter fed by the encoder's A/B channels
pub trait CounterSource {
    /// Current counter value (already masked to 16 bits by the type)
    fn count(&mut self) -> u16;
}

/// Unwrap the difference between two raw counter samples
///
/// Differences beyond half the counter range are treated as the counter
/// wrapping around, never as a real jump.
pub fn unwrap_delta(prev: u16, raw: u16) -> i32 {
    let prev = i32::from(prev);
    let raw = i32::from(raw);

    let mut delta = raw - prev;
    if delta <= -HALF_RANGE {
        delta += COUNTER_MODULUS;
        if raw > prev {
            delta = raw - COUNTER_MODULUS - prev;
        }
    }
    if delta >= HALF_RANGE {
        delta -= COUNTER_MODULUS;
        if raw < prev {
            delta = raw + COUNTER_MODULUS - prev;
        }
    }
    delta
}

/// Tracks the unbounded position of one encoder
pub struct PositionTracker<E> {
    counter: E,
    position: i64,
    last_raw: u16,
}

impl<E: CounterSource> PositionTracker<E> {
    /// Wrap a counter; the previous sample starts at 0 like a freshly reset timer
    pub fn new(counter: E) -> Self {
        Self {
            counter,
            position: 0,
            last_raw: 0,
        }
    }

    /// Sample the counter and fold the unwrapped delta into the position
    ///
    /// Position moves opposite to the raw count. This polarity matches the
    /// forward channel of [`ActuatorDriver`](super::ActuatorDriver).
    pub fn read(&mut self) {
        let raw = self.counter.count();
        let delta = unwrap_delta(self.last_raw, raw);
        self.last_raw = raw;
        self.position -= i64::from(delta);
        trace!("Encoder raw={} position={}", raw, self.position);
    }

    /// Reset the position to zero (the last raw sample is kept)
    pub fn zero(&mut self) {
        self.position = 0;
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn last_raw(&self) -> u16 {
        self.last_raw
    }
}
