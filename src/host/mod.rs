// Host side of the link
//
// Sends each controller's gain and setpoint, records the telemetry the device
// streams back until the link goes quiet, then plots one curve per controller.

pub mod collector;
pub mod plot;
pub mod prompt;

pub use collector::{Collector, Series, Trace, save_recording};
pub use prompt::prompt_config;

use serialport::ClearBuffer;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::link::{self, HostLink};
use crate::messages::{ConfigMessage, LinkLayout};

/// Host-side settings, usually filled from the command line
#[derive(Debug, Clone)]
pub struct HostOptions {
    pub port: String,
    pub baud: u32,
    /// One entry per controller, in controller order
    pub configs: Vec<ConfigMessage>,
    /// An empty read of this length ends collection
    pub timeout: Duration,
    pub save: Option<PathBuf>,
    pub plot: bool,
}

pub fn run(options: HostOptions) -> Result<Vec<Trace>, Box<dyn std::error::Error + Send + Sync>> {
    let layout = LinkLayout::for_controllers(options.configs.len() as u8);

    let port = link::open_port(&options.port, options.baud, options.timeout)?;
    // Drop whatever a previous run left unread
    port.clear(ClearBuffer::Input)?;
    let writer = port.try_clone()?;
    let mut link = HostLink::new(port, writer);

    link.send_config(&options.configs)?;

    info!("Reading telemetry for {} controller(s)", layout.controllers());
    let mut collector = Collector::new(layout);
    collector.collect_from(&mut link)?;
    let traces = collector.finish();

    if let Some(path) = &options.save {
        save_recording(path, &options.configs, &traces)?;
    }

    if options.plot {
        if traces.iter().all(Trace::is_empty) {
            warn!("No telemetry received, nothing to plot");
        } else {
            plot::show(&traces)?;
        }
    }

    Ok(traces)
}
