// Timing, link and plant configuration
use std::time::Duration;

// Minimum time between two controller updates (ms)
pub const MIN_STEP_INTERVAL_MS: u64 = 10;

// Encoder timer counts modulo 2^16
pub const COUNTER_MODULUS: i32 = 65_536;
pub const HALF_RANGE: i32 = COUNTER_MODULUS / 2;

// Serial link
pub const BAUD_RATE: u32 = 115_200;
pub const DEFAULT_PORT: &str = "/dev/ttyACM0";

// Device waits this long per read while configuration is pending, then retries
pub const DEVICE_READ_TIMEOUT: Duration = Duration::from_secs(3);

// Host stops collecting after a read this long comes back empty
pub const HOST_READ_TIMEOUT_SINGLE: Duration = Duration::from_secs(1);
pub const HOST_READ_TIMEOUT_TAGGED: Duration = Duration::from_secs(3);

// Controllers sharing one link; tags are 1-based
pub const MAX_CONTROLLERS: u8 = 2;

// Scheduler periods for controller 1 and 2 (ms)
pub const TASK_PERIODS_MS: [u64; 2] = [50, 250];

// Device ms -> s and encoder counts -> rotations on the host
pub const DISPLAY_DIVISOR: f64 = 1000.0;

// Extra room above the highest position in a plot (rotations)
pub const PLOT_HEADROOM: f64 = 0.5;

// Simulated plant: counts per ms at 100% duty
pub const SIM_COUNTS_PER_MS: f64 = 2.0;
