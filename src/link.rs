// Serial transport for configuration and telemetry
//
// Both ends work on any Read/Write pair so the protocol can be exercised
// without a port. A read timeout that returns no data is reported as
// `Line::Idle`; the device keeps waiting, the host takes it as end of stream.

use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use crate::messages::{ConfigMessage, ParseError, Sample};

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid configuration line {line:?}: {source}")]
    Parse {
        line: String,
        #[source]
        source: ParseError,
    },

    #[error("Link closed while waiting for configuration")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Open a serial port with the given read timeout
pub fn open_port(path: &str, baud: u32, timeout: Duration) -> Result<Box<dyn SerialPort>> {
    info!("Opening serial link on {} at {} baud", path, baud);
    let port = serialport::new(path, baud).timeout(timeout).open()?;
    Ok(port)
}

/// Outcome of one line read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Received text, terminator included when one arrived
    Text(String),
    /// Read timed out before any byte arrived
    Idle,
    /// The other end closed the stream
    Closed,
}

/// Newline-delimited reader that survives read timeouts
pub struct LineReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Read up to and including the next `\n`
    ///
    /// Bytes received before a timeout or end of stream are returned as a
    /// (possibly partial) line.
    pub fn read_line(&mut self) -> Result<Line> {
        let mut line = Vec::new();
        let mut closed = false;

        loop {
            let available = match self.inner.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            };
            if available.is_empty() {
                closed = true;
                break;
            }

            match available.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    line.extend_from_slice(&available[..=i]);
                    self.inner.consume(i + 1);
                    return Ok(Line::Text(String::from_utf8_lossy(&line).into_owned()));
                }
                None => {
                    let n = available.len();
                    line.extend_from_slice(available);
                    self.inner.consume(n);
                }
            }
        }

        if !line.is_empty() {
            Ok(Line::Text(String::from_utf8_lossy(&line).into_owned()))
        } else if closed {
            Ok(Line::Closed)
        } else {
            Ok(Line::Idle)
        }
    }
}

/// Device end: receives configuration, streams samples
pub struct DeviceLink<R, W> {
    reader: LineReader<R>,
    writer: W,
}

impl<R: Read, W: Write> DeviceLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: LineReader::new(reader),
            writer,
        }
    }

    /// Next non-empty token, waiting through idle reads
    ///
    /// A token is complete only once its `\n` arrives; fragments cut by a
    /// read timeout are joined with what follows.
    fn next_token(&mut self) -> Result<String> {
        let mut pending = String::new();
        loop {
            match self.reader.read_line()? {
                Line::Text(text) => {
                    pending.push_str(&text);
                    if !text.ends_with('\n') {
                        continue;
                    }
                    let token = pending.trim();
                    if !token.is_empty() {
                        return Ok(token.to_string());
                    }
                    pending.clear();
                }
                Line::Idle => continue,
                Line::Closed => {
                    // The final token may lack its terminator
                    let token = pending.trim();
                    return if token.is_empty() {
                        Err(LinkError::Closed)
                    } else {
                        Ok(token.to_string())
                    };
                }
            }
        }
    }

    /// Block until a gain line and a setpoint line have arrived
    pub fn read_config(&mut self) -> Result<ConfigMessage> {
        let line = self.next_token()?;
        let gain = ConfigMessage::parse_gain(&line).map_err(|source| LinkError::Parse {
            line: line.clone(),
            source,
        })?;
        debug!("Received gain {}", gain);

        let line = self.next_token()?;
        let setpoint =
            ConfigMessage::parse_setpoint(&line).map_err(|source| LinkError::Parse {
                line: line.clone(),
                source,
            })?;
        debug!("Received setpoint {}", setpoint);

        Ok(ConfigMessage { gain, setpoint })
    }

    /// Write one telemetry line
    pub fn send_sample(&mut self, sample: &Sample) -> Result<()> {
        self.writer.write_all(sample.to_line().as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

/// Host end: sends configuration, reads telemetry lines
pub struct HostLink<R, W> {
    reader: LineReader<R>,
    writer: W,
}

impl<R: Read, W: Write> HostLink<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: LineReader::new(reader),
            writer,
        }
    }

    /// Send each controller's gain and setpoint, in controller order
    pub fn send_config(&mut self, configs: &[ConfigMessage]) -> Result<()> {
        for (i, config) in configs.iter().enumerate() {
            info!(
                "Configuring controller {}: gain={} setpoint={}",
                i + 1,
                config.gain,
                config.setpoint
            );
            self.writer.write_all(config.to_lines().as_bytes())?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Next telemetry line, or `None` once a read comes back empty
    pub fn next_line(&mut self) -> Result<Option<String>> {
        match self.reader.read_line()? {
            Line::Text(text) => Ok(Some(text)),
            Line::Idle | Line::Closed => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ControllerTag;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Reader that replays chunks and reports a timeout between them
    struct Chunked(VecDeque<Option<&'static [u8]>>);

    impl Read for Chunked {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Some(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(chunk);
                    Ok(chunk.len())
                }
                Some(None) => Err(io::Error::new(ErrorKind::TimedOut, "timed out")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_line_reader_events() {
        let chunks = Chunked(
            vec![
                Some(&b"12 3"[..]),
                Some(&b"4\r\n56"[..]),
                None,
                None,
                Some(&b"7 8\r\n"[..]),
            ]
            .into(),
        );
        let mut reader = LineReader::new(chunks);

        assert_eq!(reader.read_line().unwrap(), Line::Text("12 34\r\n".into()));
        assert_eq!(reader.read_line().unwrap(), Line::Text("56".into()));
        assert_eq!(reader.read_line().unwrap(), Line::Idle);
        assert_eq!(reader.read_line().unwrap(), Line::Text("7 8\r\n".into()));
        assert_eq!(reader.read_line().unwrap(), Line::Closed);
    }

    #[test]
    fn test_device_reads_config_through_idle_reads() {
        let chunks = Chunked(
            vec![
                None,
                Some(&b"\r\n"[..]),
                Some(&b"1.5\r\n"[..]),
                None,
                Some(&b"-300\r\n0.2\r\n700\r\n"[..]),
            ]
            .into(),
        );
        let mut link = DeviceLink::new(chunks, Vec::new());

        let first = link.read_config().unwrap();
        let second = link.read_config().unwrap();

        assert_eq!(
            first,
            ConfigMessage {
                gain: 1.5,
                setpoint: -300
            }
        );
        assert_eq!(
            second,
            ConfigMessage {
                gain: 0.2,
                setpoint: 700
            }
        );
        assert!(matches!(link.read_config(), Err(LinkError::Closed)));
    }

    #[test]
    fn test_device_joins_token_split_by_timeout() {
        let chunks = Chunked(
            vec![
                Some(&b"12"[..]),
                None,
                Some(&b".5\r\n30"[..]),
                None,
                None,
                Some(&b"0\r\n"[..]),
            ]
            .into(),
        );
        let mut link = DeviceLink::new(chunks, Vec::new());

        assert_eq!(
            link.read_config().unwrap(),
            ConfigMessage {
                gain: 12.5,
                setpoint: 300
            }
        );
    }

    #[test]
    fn test_device_rejects_bad_setpoint() {
        let mut link = DeviceLink::new(Cursor::new(b"1.0\r\nhome\r\n".to_vec()), Vec::new());
        match link.read_config() {
            Err(LinkError::Parse { line, .. }) => assert_eq!(line, "home"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_device_sends_sample_lines() {
        let mut link = DeviceLink::new(io::empty(), Vec::new());
        link.send_sample(&Sample {
            tag: None,
            elapsed_ms: 10,
            position: 5,
        })
        .unwrap();
        link.send_sample(&Sample {
            tag: ControllerTag::new(1),
            elapsed_ms: 20,
            position: -5,
        })
        .unwrap();
        assert_eq!(link.writer().as_slice(), b"10 5\r\n1 20 -5\r\n");
    }

    #[test]
    fn test_host_config_matches_device_parser() {
        let configs = [
            ConfigMessage {
                gain: 1.0,
                setpoint: 100,
            },
            ConfigMessage {
                gain: 0.25,
                setpoint: -4000,
            },
        ];
        let mut host = HostLink::new(io::empty(), Vec::new());
        host.send_config(&configs).unwrap();

        let mut device = DeviceLink::new(Cursor::new(host.writer), Vec::new());
        assert_eq!(device.read_config().unwrap(), configs[0]);
        assert_eq!(device.read_config().unwrap(), configs[1]);
    }

    #[test]
    fn test_host_stops_on_empty_read() {
        let chunks = Chunked(vec![Some(&b"1 2\r\n"[..]), None, Some(&b"3 4\r\n"[..])].into());
        let mut host = HostLink::new(chunks, io::sink());

        assert_eq!(host.next_line().unwrap().as_deref(), Some("1 2\r\n"));
        assert_eq!(host.next_line().unwrap(), None);
    }
}
