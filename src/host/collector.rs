// Telemetry collection on the host
//
// Lines are demultiplexed by controller tag into per-controller buffers in
// arrival order. Lines that do not parse are dropped and reading continues.
// After the link closes the buffers are converted to seconds and rotations.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::config::DISPLAY_DIVISOR;
use crate::link::{self, HostLink};
use crate::messages::{ConfigMessage, LinkLayout, Sample};

/// Raw samples of one controller, device units
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Series {
    pub elapsed_ms: Vec<u64>,
    pub position: Vec<i64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.elapsed_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed_ms.is_empty()
    }
}

/// Samples of one controller converted for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    /// 1-based controller number
    pub controller: u8,
    pub seconds: Vec<f64>,
    pub rotations: Vec<f64>,
}

impl Trace {
    fn from_series(controller: u8, series: &Series) -> Self {
        Self {
            controller,
            seconds: series
                .elapsed_ms
                .iter()
                .map(|&ms| ms as f64 / DISPLAY_DIVISOR)
                .collect(),
            rotations: series
                .position
                .iter()
                .map(|&counts| counts as f64 / DISPLAY_DIVISOR)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.seconds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seconds.is_empty()
    }
}

pub struct Collector {
    layout: LinkLayout,
    series: Vec<Series>,
    discarded: usize,
}

impl Collector {
    pub fn new(layout: LinkLayout) -> Self {
        Self {
            layout,
            series: vec![Series::default(); usize::from(layout.controllers())],
            discarded: 0,
        }
    }

    /// Parse one line into its controller's buffer; false if it was dropped
    pub fn ingest(&mut self, line: &str) -> bool {
        let sample = match Sample::parse(line, self.layout) {
            Ok(sample) => sample,
            Err(e) => {
                debug!("Discarding line {:?}: {}", line, e);
                self.discarded += 1;
                return false;
            }
        };

        let index = sample.tag.map_or(0, |tag| tag.index());
        let Some(series) = self.series.get_mut(index) else {
            self.discarded += 1;
            return false;
        };
        series.elapsed_ms.push(sample.elapsed_ms);
        series.position.push(sample.position);
        debug!("{}", sample);
        true
    }

    /// Read lines until a read comes back empty
    pub fn collect_from<R: Read, W: Write>(
        &mut self,
        link: &mut HostLink<R, W>,
    ) -> link::Result<()> {
        while let Some(line) = link.next_line()? {
            self.ingest(&line);
        }
        info!(
            "Link quiet, stopped reading ({} samples, {} lines discarded)",
            self.accepted(),
            self.discarded
        );
        Ok(())
    }

    /// Buffer of the controller at a 0-based position
    pub fn series(&self, index: usize) -> Option<&Series> {
        self.series.get(index)
    }

    pub fn accepted(&self) -> usize {
        self.series.iter().map(Series::len).sum()
    }

    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Per-controller traces in seconds and rotations
    pub fn finish(&self) -> Vec<Trace> {
        self.series
            .iter()
            .enumerate()
            .map(|(i, series)| Trace::from_series((i + 1) as u8, series))
            .collect()
    }
}

#[derive(Serialize)]
struct Recording<'a> {
    configs: &'a [ConfigMessage],
    traces: &'a [Trace],
}

/// Write the configuration and collected traces as pretty JSON
pub fn save_recording(
    path: &Path,
    configs: &[ConfigMessage],
    traces: &[Trace],
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &Recording { configs, traces })?;
    writer.flush()?;
    info!("Saved recording to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    #[test]
    fn test_single_round_trip_units() {
        let line = Sample {
            tag: None,
            elapsed_ms: 1234,
            position: -56,
        }
        .to_line();

        let mut collector = Collector::new(LinkLayout::Single);
        assert!(collector.ingest(&line));
        let traces = collector.finish();

        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].seconds, vec![1.234]);
        assert_eq!(traces[0].rotations, vec![-0.056]);
    }

    #[test]
    fn test_tagged_lines_stay_with_their_controller() {
        let mut collector = Collector::new(LinkLayout::Tagged { controllers: 2 });

        assert!(collector.ingest("1 50 10\r\n"));
        assert!(collector.ingest("2 987 -15\r\n"));
        assert!(collector.ingest("1 100 20\r\n"));

        let first = collector.series(0).unwrap();
        let second = collector.series(1).unwrap();
        assert_eq!(first.elapsed_ms, vec![50, 100]);
        assert_eq!(first.position, vec![10, 20]);
        assert_eq!(second.elapsed_ms, vec![987]);
        assert_eq!(second.position, vec![-15]);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let mut collector = Collector::new(LinkLayout::Tagged { controllers: 2 });

        assert!(!collector.ingest("1 50\r\n"));
        assert!(!collector.ingest("x 50 10\r\n"));
        assert!(!collector.ingest("3 50 10\r\n"));
        assert!(!collector.ingest("1 5O 10\r\n"));
        assert!(collector.ingest("1 60 11\r\n"));

        assert_eq!(collector.discarded(), 4);
        assert_eq!(collector.accepted(), 1);
    }

    #[test]
    fn test_collect_until_link_closes() {
        let stream = b"10 0\r\ngarbage\r\n20 -3\r\n30 -9".to_vec();
        let mut link = HostLink::new(Cursor::new(stream), io::sink());
        let mut collector = Collector::new(LinkLayout::Single);

        collector.collect_from(&mut link).unwrap();

        let series = collector.series(0).unwrap();
        assert_eq!(series.elapsed_ms, vec![10, 20, 30]);
        assert_eq!(series.position, vec![0, -3, -9]);
        assert_eq!(collector.discarded(), 1);
    }

    #[test]
    fn test_recording_json_shape() {
        let traces = vec![Trace {
            controller: 1,
            seconds: vec![0.01],
            rotations: vec![0.5],
        }];
        let configs = [ConfigMessage {
            gain: 0.5,
            setpoint: 500,
        }];
        let value = serde_json::to_value(Recording {
            configs: &configs,
            traces: &traces,
        })
        .unwrap();

        assert_eq!(value["configs"][0]["setpoint"], 500);
        assert_eq!(value["traces"][0]["controller"], 1);
        assert_eq!(value["traces"][0]["rotations"][0], 0.5);
    }
}
