// Message types carried by the serial link
//
// Configuration travels host -> device as two ASCII lines (gain, setpoint).
// Telemetry travels device -> host as one line per controller update:
//   single controller:    "<elapsed> <position>\r\n"
//   several controllers:  "<tag> <elapsed> <position>\r\n"

use serde::Serialize;
use std::fmt;

use crate::config::MAX_CONTROLLERS;

/// Line terminator used in both directions
pub const LINE_END: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Expected {expected} fields, got {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("Invalid {field}: {token:?}")]
    InvalidNumber { field: &'static str, token: String },

    #[error("Controller tag {tag} outside 1..={max}")]
    UnknownTag { tag: u8, max: u8 },
}

/// 1-based identifier of a controller sharing the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerTag(u8);

impl ControllerTag {
    /// Tags start at 1; 0 is rejected
    pub fn new(tag: u8) -> Option<Self> {
        (tag >= 1).then_some(Self(tag))
    }

    /// Tag for the controller at a 0-based position
    pub fn from_index(index: usize) -> Option<Self> {
        u8::try_from(index + 1).ok().map(Self)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0) - 1
    }
}

impl fmt::Display for ControllerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether telemetry lines carry a controller tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayout {
    Single,
    Tagged { controllers: u8 },
}

impl LinkLayout {
    pub fn for_controllers(controllers: u8) -> Self {
        if controllers <= 1 {
            Self::Single
        } else {
            Self::Tagged { controllers }
        }
    }

    pub fn controllers(&self) -> u8 {
        match self {
            Self::Single => 1,
            Self::Tagged { controllers } => *controllers,
        }
    }

    /// Tag attached to the controller at `index`, if lines are tagged
    pub fn tag_for(&self, index: usize) -> Option<ControllerTag> {
        match self {
            Self::Single => None,
            Self::Tagged { .. } => ControllerTag::from_index(index),
        }
    }
}

/// Gain and setpoint for one controller, sent once before it starts
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfigMessage {
    pub gain: f32,
    pub setpoint: i64,
}

impl ConfigMessage {
    pub fn parse_gain(token: &str) -> Result<f32, ParseError> {
        let token = token.trim();
        token.parse().map_err(|_| ParseError::InvalidNumber {
            field: "gain",
            token: token.to_string(),
        })
    }

    pub fn parse_setpoint(token: &str) -> Result<i64, ParseError> {
        let token = token.trim();
        token.parse().map_err(|_| ParseError::InvalidNumber {
            field: "setpoint",
            token: token.to_string(),
        })
    }

    /// Both lines as written by the host
    pub fn to_lines(&self) -> String {
        format!("{}{}{}{}", self.gain, LINE_END, self.setpoint, LINE_END)
    }
}

/// One telemetry point from one controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub tag: Option<ControllerTag>,
    /// Accumulated time between updates (ms)
    pub elapsed_ms: u64,
    /// Encoder position (counts)
    pub position: i64,
}

impl Sample {
    /// Encode as a wire line, terminator included
    pub fn to_line(&self) -> String {
        format!("{}{}", self, LINE_END)
    }

    /// Parse one received line; surrounding whitespace and CR/LF are ignored
    pub fn parse(line: &str, layout: LinkLayout) -> Result<Self, ParseError> {
        let fields: Vec<&str> = line.split_whitespace().collect();

        let (tag, rest) = match layout {
            LinkLayout::Single => {
                if fields.len() != 2 {
                    return Err(ParseError::FieldCount {
                        expected: 2,
                        found: fields.len(),
                    });
                }
                (None, &fields[..])
            }
            LinkLayout::Tagged { controllers } => {
                if fields.len() != 3 {
                    return Err(ParseError::FieldCount {
                        expected: 3,
                        found: fields.len(),
                    });
                }
                let raw: u8 = fields[0].parse().map_err(|_| ParseError::InvalidNumber {
                    field: "tag",
                    token: fields[0].to_string(),
                })?;
                let max = controllers.min(MAX_CONTROLLERS);
                let tag = ControllerTag::new(raw)
                    .filter(|tag| tag.get() <= max)
                    .ok_or(ParseError::UnknownTag { tag: raw, max })?;
                (Some(tag), &fields[1..])
            }
        };

        let elapsed_ms = rest[0].parse().map_err(|_| ParseError::InvalidNumber {
            field: "elapsed",
            token: rest[0].to_string(),
        })?;
        let position = rest[1].parse().map_err(|_| ParseError::InvalidNumber {
            field: "position",
            token: rest[1].to_string(),
        })?;

        Ok(Self {
            tag,
            elapsed_ms,
            position,
        })
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag {
            Some(tag) => write!(f, "{} {} {}", tag, self.elapsed_ms, self.position),
            None => write!(f, "{} {}", self.elapsed_ms, self.position),
        }
    }
}
