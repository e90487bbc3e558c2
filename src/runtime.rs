// Device runtime: cooperative periodic dispatch of the control loops
//
// Every controller is wrapped in a task that the scheduler runs at a fixed
// period on a single thread. Tasks never block; on Ctrl-C the scheduler stops
// and every task releases its motor before the process exits.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::config::{DEVICE_READ_TIMEOUT, MAX_CONTROLLERS, TASK_PERIODS_MS};
use crate::link::{self, DeviceLink};
use crate::messages::{ControllerTag, LinkLayout, Sample};
use crate::motor::{
    ActuatorDriver, Clock, CounterSource, MonotonicClock, PositionController, PositionTracker,
    PwmOutput, SimMotor, StepOutcome,
};

/// Unit of work invoked by a scheduler at a fixed interval
pub trait PeriodicTask {
    fn name(&self) -> &str;

    fn period(&self) -> Duration;

    /// Do one slice of work and return promptly
    fn run_once(&mut self);

    /// Leave the hardware in a safe state; called once when the scheduler stops
    fn shutdown(&mut self);
}

/// Destination for telemetry samples
pub trait TelemetrySink {
    fn send_sample(&mut self, sample: &Sample) -> link::Result<()>;
}

impl<R: std::io::Read, W: std::io::Write> TelemetrySink for DeviceLink<R, W> {
    fn send_sample(&mut self, sample: &Sample) -> link::Result<()> {
        DeviceLink::send_sample(self, sample)
    }
}

/// Runs one position controller and streams its samples
pub struct ControlTask<E, P, C, S>
where
    E: CounterSource,
    P: PwmOutput,
    C: Clock,
{
    name: String,
    period: Duration,
    tag: Option<ControllerTag>,
    controller: PositionController<E, P, C>,
    sink: Rc<RefCell<S>>,
}

impl<E, P, C, S> ControlTask<E, P, C, S>
where
    E: CounterSource,
    P: PwmOutput,
    C: Clock,
    S: TelemetrySink,
{
    pub fn new(
        name: impl Into<String>,
        period: Duration,
        tag: Option<ControllerTag>,
        controller: PositionController<E, P, C>,
        sink: Rc<RefCell<S>>,
    ) -> Self {
        Self {
            name: name.into(),
            period,
            tag,
            controller,
            sink,
        }
    }

    pub fn controller(&self) -> &PositionController<E, P, C> {
        &self.controller
    }
}

impl<E, P, C, S> PeriodicTask for ControlTask<E, P, C, S>
where
    E: CounterSource,
    P: PwmOutput,
    C: Clock,
    S: TelemetrySink,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn run_once(&mut self) {
        if let StepOutcome::Updated(reading) = self.controller.step() {
            let sample = Sample {
                tag: self.tag,
                elapsed_ms: reading.elapsed_ms,
                position: reading.position,
            };
            if let Err(e) = self.sink.borrow_mut().send_sample(&sample) {
                warn!("{}: dropped sample {}: {}", self.name, sample, e);
            }
        }
    }

    fn shutdown(&mut self) {
        self.controller.shutdown();
        info!("{}: motor shut off", self.name);
    }
}

struct Slot {
    task: Box<dyn PeriodicTask>,
    next_due: Instant,
    runs: u64,
}

/// Single-threaded fixed-period scheduler
///
/// Due tasks run in registration order. A task that falls behind is not run
/// repeatedly to catch up; its next run is rescheduled one period from now.
#[derive(Default)]
pub struct Scheduler {
    slots: Vec<Slot>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; its first run is due immediately
    pub fn add(&mut self, task: Box<dyn PeriodicTask>) {
        info!(
            "Scheduling {} every {}ms",
            task.name(),
            task.period().as_millis()
        );
        self.slots.push(Slot {
            task,
            next_due: Instant::now(),
            runs: 0,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Dispatch tasks until `cancel` completes, then shut every task down
    pub async fn run_until<F: Future<Output = ()>>(&mut self, cancel: F) {
        tokio::pin!(cancel);

        loop {
            let Some(due) = self.slots.iter().map(|slot| slot.next_due).min() else {
                (&mut cancel).await;
                break;
            };

            tokio::select! {
                _ = &mut cancel => {
                    info!("Abort requested, stopping scheduler");
                    break;
                }
                _ = sleep_until(due) => self.run_due(Instant::now()),
            }
        }

        self.shutdown();
    }

    fn run_due(&mut self, now: Instant) {
        for slot in &mut self.slots {
            if slot.next_due > now {
                continue;
            }
            slot.task.run_once();
            slot.runs += 1;

            let period = slot.task.period();
            slot.next_due += period;
            if slot.next_due <= now {
                debug!("{} overran its period", slot.task.name());
                slot.next_due = now + period;
            }
        }
    }

    /// Stop every task; each one must release its actuator
    pub fn shutdown(&mut self) {
        for slot in &mut self.slots {
            slot.task.shutdown();
            info!("{} ran {} times", slot.task.name(), slot.runs);
        }
    }
}

/// Device-side settings, usually filled from the command line
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    pub port: String,
    pub baud: u32,
    pub controllers: u8,
    pub periods_ms: Vec<u64>,
    pub sim_counts_per_ms: f64,
}

pub async fn run(options: DeviceOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let controllers = options.controllers.clamp(1, MAX_CONTROLLERS);
    let layout = LinkLayout::for_controllers(controllers);

    let port = link::open_port(&options.port, options.baud, DEVICE_READ_TIMEOUT)?;
    let writer = port.try_clone()?;
    let link = Rc::new(RefCell::new(DeviceLink::new(port, writer)));

    // Motors and encoders exist before any configuration arrives
    let clock = MonotonicClock::new();
    let motors: Vec<_> = (0..controllers)
        .map(|_| SimMotor::new(options.sim_counts_per_ms, clock))
        .collect();
    info!(
        "Using {} simulated motor(s) at {} counts/ms full duty",
        motors.len(),
        options.sim_counts_per_ms
    );

    // Nothing else runs until every controller is configured
    let mut scheduler = Scheduler::new();
    for (i, motor) in motors.iter().enumerate() {
        info!("Waiting for configuration of controller {}", i + 1);
        let config = link.borrow_mut().read_config()?;

        let (counter, bridge) = motor.split();
        let controller = PositionController::new(
            config,
            PositionTracker::new(counter),
            ActuatorDriver::new(bridge),
            clock,
        );
        let period_ms = options
            .periods_ms
            .get(i)
            .copied()
            .unwrap_or(TASK_PERIODS_MS[i % TASK_PERIODS_MS.len()]);

        scheduler.add(Box::new(ControlTask::new(
            format!("controller-{}", i + 1),
            Duration::from_millis(period_ms),
            layout.tag_for(i),
            controller,
            Rc::clone(&link),
        )));
    }

    info!("Runtime started with {} controller(s), Ctrl-C to stop", scheduler.len());
    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ConfigMessage;
    use crate::motor::{DutyPair, ManualClock};

    struct Probe {
        name: &'static str,
        period: Duration,
        runs: Rc<RefCell<Vec<Instant>>>,
        stopped: Rc<RefCell<bool>>,
    }

    impl PeriodicTask for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn period(&self) -> Duration {
            self.period
        }

        fn run_once(&mut self) {
            self.runs.borrow_mut().push(Instant::now());
        }

        fn shutdown(&mut self) {
            *self.stopped.borrow_mut() = true;
        }
    }

    #[derive(Default)]
    struct Collect(Vec<Sample>);

    impl TelemetrySink for Collect {
        fn send_sample(&mut self, sample: &Sample) -> link::Result<()> {
            self.0.push(*sample);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_at_their_periods() {
        let fast_runs = Rc::new(RefCell::new(Vec::new()));
        let slow_runs = Rc::new(RefCell::new(Vec::new()));
        let fast_stopped = Rc::new(RefCell::new(false));
        let slow_stopped = Rc::new(RefCell::new(false));

        let mut scheduler = Scheduler::new();
        scheduler.add(Box::new(Probe {
            name: "fast",
            period: Duration::from_millis(50),
            runs: Rc::clone(&fast_runs),
            stopped: Rc::clone(&fast_stopped),
        }));
        scheduler.add(Box::new(Probe {
            name: "slow",
            period: Duration::from_millis(250),
            runs: Rc::clone(&slow_runs),
            stopped: Rc::clone(&slow_stopped),
        }));

        let start = Instant::now();
        scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(260)))
            .await;

        let offsets = |runs: &Rc<RefCell<Vec<Instant>>>| -> Vec<u128> {
            runs.borrow()
                .iter()
                .map(|t| (*t - start).as_millis())
                .collect()
        };
        assert_eq!(offsets(&fast_runs), vec![0, 50, 100, 150, 200, 250]);
        assert_eq!(offsets(&slow_runs), vec![0, 250]);
        assert!(*fast_stopped.borrow());
        assert!(*slow_stopped.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_releases_every_motor() {
        let sink = Rc::new(RefCell::new(Collect::default()));
        let clock = ManualClock::new();
        let layout = LinkLayout::for_controllers(2);

        let mut motors = Vec::new();
        let mut scheduler = Scheduler::new();
        for i in 0..2 {
            let motor = SimMotor::new(1.0, clock.clone());
            let (counter, bridge) = motor.split();
            let mut controller = PositionController::new(
                ConfigMessage {
                    gain: 1.0,
                    setpoint: 500,
                },
                PositionTracker::new(counter),
                ActuatorDriver::new(bridge),
                clock.clone(),
            );
            clock.advance(10);
            controller.step();
            assert_ne!(controller.driver().duty(), DutyPair::zero());

            let task = ControlTask::new(
                format!("controller-{}", i + 1),
                Duration::from_millis(50),
                layout.tag_for(i),
                controller,
                Rc::clone(&sink),
            );
            motors.push(motor);
            scheduler.add(Box::new(task));
        }

        scheduler.run_until(async {}).await;

        // With the bridges released the shafts no longer move
        let before: Vec<f64> = motors.iter().map(|m| m.shaft()).collect();
        clock.advance(1000);
        let after: Vec<f64> = motors.iter().map(|m| m.shaft()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_control_task_tags_samples() {
        let sink = Rc::new(RefCell::new(Collect::default()));
        let clock = ManualClock::new();
        let motor = SimMotor::new(1.0, clock.clone());
        let (counter, bridge) = motor.split();
        let controller = PositionController::new(
            ConfigMessage {
                gain: 1.0,
                setpoint: 100,
            },
            PositionTracker::new(counter),
            ActuatorDriver::new(bridge),
            clock.clone(),
        );
        let mut task = ControlTask::new(
            "controller-2",
            Duration::from_millis(50),
            ControllerTag::new(2),
            controller,
            Rc::clone(&sink),
        );

        task.run_once();
        clock.advance(50);
        task.run_once();
        clock.advance(5);
        task.run_once();

        let samples = &sink.borrow().0;
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].tag, ControllerTag::new(2));
        assert_eq!(samples[0].elapsed_ms, 50);
        assert_eq!(samples[0].to_line(), "2 50 0\r\n");
        assert_eq!(task.controller().driver().duty().forward, 100.0);
    }
}
