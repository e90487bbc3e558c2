// Step response: run one or two controllers against simulated motors
//
// Prints the telemetry lines the device would stream, using a simulated clock
// so the run finishes immediately.
//
// Usage: cargo run --example step_response -- [gain] [setpoint] [duration_ms]
// Example: cargo run --example step_response -- 0.05 4000 3000

use servo_link::config::{MIN_STEP_INTERVAL_MS, SIM_COUNTS_PER_MS};
use servo_link::messages::{ConfigMessage, LinkLayout, Sample};
use servo_link::motor::{
    ActuatorDriver, Clock, ManualClock, PositionController, PositionTracker, SimMotor, StepOutcome,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let gain: f32 = args.next().as_deref().unwrap_or("0.05").parse()?;
    let setpoint: i64 = args.next().as_deref().unwrap_or("4000").parse()?;
    let duration_ms: u64 = args.next().as_deref().unwrap_or("3000").parse()?;

    // Second controller chases the opposite setpoint at half the gain
    let configs = [
        ConfigMessage { gain, setpoint },
        ConfigMessage {
            gain: gain / 2.0,
            setpoint: -setpoint,
        },
    ];
    let layout = LinkLayout::for_controllers(configs.len() as u8);

    let clock = ManualClock::new();
    let motors: Vec<_> = configs
        .iter()
        .map(|_| SimMotor::new(SIM_COUNTS_PER_MS, clock.clone()))
        .collect();
    let mut controllers: Vec<_> = configs
        .iter()
        .zip(&motors)
        .map(|(config, motor)| {
            let (counter, bridge) = motor.split();
            PositionController::new(
                *config,
                PositionTracker::new(counter),
                ActuatorDriver::new(bridge),
                clock.clone(),
            )
        })
        .collect();

    while clock.now_ms() < duration_ms {
        clock.advance(MIN_STEP_INTERVAL_MS);
        for (i, controller) in controllers.iter_mut().enumerate() {
            if let StepOutcome::Updated(reading) = controller.step() {
                let sample = Sample {
                    tag: layout.tag_for(i),
                    elapsed_ms: reading.elapsed_ms,
                    position: reading.position,
                };
                print!("{}", sample.to_line());
            }
        }
    }

    for controller in &mut controllers {
        controller.shutdown();
    }
    Ok(())
}
