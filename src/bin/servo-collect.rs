// Host collector: configure the controllers, record their telemetry, plot it
//
// Usage: servo-collect --port /dev/ttyACM0 --controllers 2 \
//            --gain 0.5 --setpoint 4000 --gain 0.3 --setpoint -2000

use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use servo_link::config::{
    BAUD_RATE, DEFAULT_PORT, HOST_READ_TIMEOUT_SINGLE, HOST_READ_TIMEOUT_TAGGED, MAX_CONTROLLERS,
};
use servo_link::host::{self, HostOptions, prompt_config};
use servo_link::messages::ConfigMessage;

/// Send gains and setpoints to the device, then plot the returned position curves
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Serial port shared with the device
    #[arg(short, long, default_value = DEFAULT_PORT)]
    port: String,

    #[arg(short, long, default_value_t = BAUD_RATE)]
    baud: u32,

    /// Number of controllers on the device
    #[arg(short, long, default_value_t = 1,
          value_parser = clap::value_parser!(u8).range(1..=i64::from(MAX_CONTROLLERS)))]
    controllers: u8,

    /// Proportional gain, once per controller in order (prompted when missing)
    #[arg(long, allow_negative_numbers = true)]
    gain: Vec<f32>,

    /// Target position in encoder counts, once per controller in order
    #[arg(long, allow_negative_numbers = true)]
    setpoint: Vec<i64>,

    /// Stop collecting after a read stays empty this long (ms)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Save configuration and traces as JSON
    #[arg(long)]
    save: Option<PathBuf>,

    /// Skip the terminal plot
    #[arg(long)]
    no_plot: bool,
}

fn resolve_configs(args: &Args) -> io::Result<Vec<ConfigMessage>> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    (0..usize::from(args.controllers))
        .map(|i| match (args.gain.get(i), args.setpoint.get(i)) {
            (Some(&gain), Some(&setpoint)) => Ok(ConfigMessage { gain, setpoint }),
            _ => prompt_config(&mut input, &mut output, i + 1),
        })
        .collect()
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let configs = resolve_configs(&args)?;
    let timeout = match args.timeout_ms {
        Some(ms) => Duration::from_millis(ms),
        None if configs.len() > 1 => HOST_READ_TIMEOUT_TAGGED,
        None => HOST_READ_TIMEOUT_SINGLE,
    };

    let traces = host::run(HostOptions {
        port: args.port,
        baud: args.baud,
        configs,
        timeout,
        save: args.save,
        plot: !args.no_plot,
    })?;

    for trace in &traces {
        println!("Controller {}: {} samples", trace.controller, trace.len());
    }
    Ok(())
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Collector error: {}", e);
        std::process::exit(1);
    }
}
