// Two-channel PWM motor driver
//
// Direction is encoded by which of the two H-bridge inputs carries the PWM
// signal; the other input is held at 0%.

use tracing::{debug, info};

/// H-bridge input channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// IN1, driven for negative levels
    Reverse,
    /// IN2, driven for positive levels
    Forward,
}

/// PWM output stage of one motor
pub trait PwmOutput {
    /// Enable the bridge (pull the enable pin high)
    fn enable(&mut self);

    /// Set the pulse width of one channel as a percentage of the period.
    /// Values outside 0..=100 are handed over unchanged.
    fn set_percent(&mut self, channel: Channel, percent: f32);
}

/// Duty cycles currently applied to both channels (percent)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DutyPair {
    pub forward: f32,
    pub reverse: f32,
}

impl DutyPair {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Same magnitudes with the channels exchanged
    pub fn swapped(&self) -> Self {
        Self {
            forward: self.reverse,
            reverse: self.forward,
        }
    }
}

/// Maps a signed level to the two PWM channels
pub struct ActuatorDriver<P: PwmOutput> {
    pwm: P,
    duty: DutyPair,
    enabled: bool,
}

impl<P: PwmOutput> ActuatorDriver<P> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            duty: DutyPair::zero(),
            enabled: false,
        }
    }

    /// Drive the motor with a signed level, conventionally -100..=100
    ///
    /// Negative levels drive the reverse channel with `-level`, positive levels
    /// the forward channel with `level`, zero releases both.
    pub fn set_duty_cycle(&mut self, level: f32) {
        self.pwm.enable();
        self.enabled = true;

        let duty = if level < 0.0 {
            DutyPair {
                forward: 0.0,
                reverse: -level,
            }
        } else if level > 0.0 {
            DutyPair {
                forward: level,
                reverse: 0.0,
            }
        } else {
            DutyPair::zero()
        };

        self.pwm.set_percent(Channel::Reverse, duty.reverse);
        self.pwm.set_percent(Channel::Forward, duty.forward);
        self.duty = duty;

        debug!(
            "Duty cycle: level={} forward={} reverse={}",
            level, duty.forward, duty.reverse
        );
    }

    /// Release both channels
    pub fn stop(&mut self) {
        self.set_duty_cycle(0.0);
    }

    pub fn duty(&self) -> DutyPair {
        self.duty
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl<P: PwmOutput> Drop for ActuatorDriver<P> {
    fn drop(&mut self) {
        // Never leave a bridge driven once nothing controls it
        if self.duty != DutyPair::zero() {
            info!("Stopping motor on drop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Enable,
        Set(Channel, f32),
    }

    /// Records every call made to the output stage
    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Call>>>);

    impl Recorder {
        fn take(&self) -> Vec<Call> {
            std::mem::take(&mut *self.0.borrow_mut())
        }
    }

    impl PwmOutput for Recorder {
        fn enable(&mut self) {
            self.0.borrow_mut().push(Call::Enable);
        }

        fn set_percent(&mut self, channel: Channel, percent: f32) {
            self.0.borrow_mut().push(Call::Set(channel, percent));
        }
    }

    #[test]
    fn test_positive_level_drives_forward() {
        let rec = Recorder::default();
        let mut driver = ActuatorDriver::new(rec.clone());

        driver.set_duty_cycle(42.0);

        assert_eq!(
            rec.take(),
            vec![
                Call::Enable,
                Call::Set(Channel::Reverse, 0.0),
                Call::Set(Channel::Forward, 42.0),
            ]
        );
        assert_eq!(
            driver.duty(),
            DutyPair {
                forward: 42.0,
                reverse: 0.0
            }
        );
        assert!(driver.is_enabled());
    }

    #[test]
    fn test_opposite_levels_swap_channels() {
        for x in [0.5f32, 1.0, 37.5, 100.0] {
            let mut driver = ActuatorDriver::new(Recorder::default());
            driver.set_duty_cycle(x);
            let forward = driver.duty();
            driver.set_duty_cycle(-x);
            let reverse = driver.duty();

            assert_eq!(forward.swapped(), reverse, "x={}", x);
            assert_eq!(reverse.reverse, x);
            assert_eq!(reverse.forward, 0.0);
        }
    }

    #[test]
    fn test_zero_level_releases_both_channels() {
        let rec = Recorder::default();
        let mut driver = ActuatorDriver::new(rec.clone());
        driver.set_duty_cycle(-60.0);
        rec.take();

        driver.set_duty_cycle(0.0);

        assert_eq!(
            rec.take(),
            vec![
                Call::Enable,
                Call::Set(Channel::Reverse, 0.0),
                Call::Set(Channel::Forward, 0.0),
            ]
        );
        assert_eq!(driver.duty(), DutyPair::zero());
    }

    #[test]
    fn test_out_of_range_level_passes_through() {
        let mut driver = ActuatorDriver::new(Recorder::default());
        driver.set_duty_cycle(250.0);
        assert_eq!(driver.duty().forward, 250.0);
        driver.set_duty_cycle(-180.0);
        assert_eq!(driver.duty().reverse, 180.0);
    }

    #[test]
    fn test_drop_stops_driven_motor() {
        let rec = Recorder::default();
        {
            let mut driver = ActuatorDriver::new(rec.clone());
            driver.set_duty_cycle(30.0);
            rec.take();
        }
        assert_eq!(
            rec.take(),
            vec![
                Call::Enable,
                Call::Set(Channel::Reverse, 0.0),
                Call::Set(Channel::Forward, 0.0),
            ]
        );
    }

    #[test]
    fn test_drop_of_idle_driver_touches_nothing() {
        let rec = Recorder::default();
        drop(ActuatorDriver::new(rec.clone()));
        assert!(rec.take().is_empty());
    }
}
