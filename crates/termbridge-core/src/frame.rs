//! Wire frames exchanged with the remote session host.
//!
//! Every transport message carries exactly one JSON encoded [`Frame`]:
//!
//! ```text
//! {"type":"input","data":"ls -la\r"}
//! {"type":"output","data":"total 0\r\n"}
//! {"type":"resize","rows":24,"cols":80}
//! ```
//!
//! Frames carry no sequence numbers; ordering comes from the transport.
//! Inbound messages that are not frames are kept as raw terminal text
//! (see [`Inbound`]), since the remote side may emit unframed diagnostics.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Dimensions, Result};

/// One wire unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Raw keystroke text typed by the user
    Input {
        /// Exact bytes typed, possibly an escape sequence
        data: String,
    },
    /// Raw text emitted by the remote pseudo-terminal
    Output {
        /// Text chunk, possibly ending inside an escape sequence
        data: String,
    },
    /// New terminal geometry
    Resize {
        /// Number of rows
        rows: u16,
        /// Number of columns
        cols: u16,
    },
}

impl Frame {
    /// Input frame for a keystroke or paste.
    pub fn input(data: impl Into<String>) -> Self {
        Frame::Input { data: data.into() }
    }

    /// Output frame carrying remote text.
    pub fn output(data: impl Into<String>) -> Self {
        Frame::Output { data: data.into() }
    }

    /// Resize frame for the given geometry.
    pub fn resize(dimensions: Dimensions) -> Self {
        Frame::Resize {
            rows: dimensions.rows,
            cols: dimensions.cols,
        }
    }

    /// Frame kind as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Input { .. } => "input",
            Frame::Output { .. } => "output",
            Frame::Resize { .. } => "resize",
        }
    }

    /// Serialize to the wire payload.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a wire payload as a frame.
    pub fn decode(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// A decoded inbound transport message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A well-formed frame
    Frame(Frame),
    /// Anything that failed to parse, kept verbatim
    Raw(String),
}

impl Inbound {
    /// Classify an inbound message. Never fails.
    pub fn decode(payload: &str) -> Self {
        match Frame::decode(payload) {
            Ok(frame) => Inbound::Frame(frame),
            Err(_) => Inbound::Raw(payload.to_string()),
        }
    }

    /// Text that should be written to the terminal surface, if any.
    ///
    /// Output frames yield their payload, raw messages yield themselves,
    /// other well-formed frames yield nothing.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            Inbound::Frame(Frame::Output { data }) => Some(data),
            Inbound::Frame(_) => None,
            Inbound::Raw(text) => Some(text),
        }
    }
}

/// JSON Schema describing the frame format.
pub fn frame_schema() -> serde_json::Value {
    let schema = schemars::schema_for!(Frame);
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}
