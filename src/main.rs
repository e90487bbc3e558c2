use clap::Parser;
use tracing_subscriber::EnvFilter;

use servo_link::config::{BAUD_RATE, DEFAULT_PORT, MAX_CONTROLLERS, SIM_COUNTS_PER_MS};
use servo_link::runtime::{self, DeviceOptions};

/// Run the position controllers and stream their telemetry over the serial link
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Serial port shared with the host
    #[arg(short, long, default_value = DEFAULT_PORT)]
    port: String,

    #[arg(short, long, default_value_t = BAUD_RATE)]
    baud: u32,

    /// Number of controllers sharing the link
    #[arg(short, long, default_value_t = 1,
          value_parser = clap::value_parser!(u8).range(1..=i64::from(MAX_CONTROLLERS)))]
    controllers: u8,

    /// Scheduler period of each controller in ms (repeat per controller)
    #[arg(long = "period-ms")]
    period_ms: Vec<u64>,

    /// Simulated motor speed at full duty, in counts per ms
    #[arg(long, default_value_t = SIM_COUNTS_PER_MS)]
    sim_speed: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug); the link carries telemetry, logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    let options = DeviceOptions {
        port: args.port,
        baud: args.baud,
        controllers: args.controllers,
        periods_ms: args.period_ms,
        sim_counts_per_ms: args.sim_speed,
    };

    if let Err(e) = runtime::run(options).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
