//! Control frame decoding for the session channel.
//!
//! Every inbound frame is classified before anything touches the shell. The
//! decision is made from the transport type tag first and a first-bytes sniff
//! second; arbitrary payloads are never speculatively parsed as commands.
//!
//! | Frame                                   | Action                         |
//! |-----------------------------------------|--------------------------------|
//! | Text starting with `{"type"`, valid     | [`InboundAction::Resize`]      |
//! | Text starting with `{"type"`, invalid   | [`InboundAction::Ignore`]      |
//! | Any other text                          | [`InboundAction::Ignore`]      |
//! | Binary, non-empty                       | [`InboundAction::Input`]       |
//! | Binary empty, ping, pong                | [`InboundAction::Ignore`]      |
//! | Close                                   | [`InboundAction::Close`]       |
//!
//! Classification never blocks and never fails the session.

use serde::Deserialize;

use crate::error::{ControlError, Result};
use crate::framing::{Frame, TerminalSize};

/// Prefix that marks a text frame as a control command candidate.
pub const COMMAND_MARKER: &str = r#"{"type""#;

/// Wire name of the resize command.
pub const RESIZE_TYPE: &str = "resize";

/// A structured instruction carried inline on the session channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Change the terminal dimensions.
    Resize(TerminalSize),
}

impl ControlCommand {
    /// Encode the command in its wire form.
    pub fn to_json(&self) -> String {
        match self {
            // Field order matters: the type tag leads so the marker sniff matches.
            ControlCommand::Resize(size) => format!(
                r#"{{"type":"{}","cols":{},"rows":{}}}"#,
                RESIZE_TYPE, size.cols, size.rows
            ),
        }
    }
}

/// What the session should do with one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundAction {
    /// Raw bytes to write to the terminal verbatim.
    Input(Vec<u8>),
    /// Apply new terminal dimensions.
    Resize(TerminalSize),
    /// The client closed the channel.
    Close,
    /// Nothing to do.
    Ignore,
}

/// Loosely-typed wire shape; validated into a [`ControlCommand`].
#[derive(Debug, Deserialize)]
struct RawControl {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    cols: Option<i64>,
    #[serde(default)]
    rows: Option<i64>,
}

/// Returns true if a text payload looks like a control command.
pub fn is_command_candidate(text: &str) -> bool {
    text.len() > COMMAND_MARKER.len() && text.starts_with(COMMAND_MARKER)
}

/// Decode a text payload into a validated control command.
pub fn decode_control(text: &str) -> Result<ControlCommand> {
    if !is_command_candidate(text) {
        return Err(ControlError::NotACommand);
    }

    let raw: RawControl =
        serde_json::from_str(text).map_err(|e| ControlError::Malformed(e.to_string()))?;

    if raw.kind != RESIZE_TYPE {
        return Err(ControlError::UnknownType(raw.kind));
    }

    match (dimension(raw.cols), dimension(raw.rows)) {
        (Some(cols), Some(rows)) => Ok(ControlCommand::Resize(TerminalSize::new(cols, rows))),
        _ => Err(ControlError::InvalidDimensions {
            cols: raw.cols,
            rows: raw.rows,
        }),
    }
}

/// A dimension is usable only if it is strictly positive and fits a `u16`.
fn dimension(value: Option<i64>) -> Option<u16> {
    value
        .filter(|v| *v > 0)
        .and_then(|v| u16::try_from(v).ok())
}

/// Classify one inbound frame.
pub fn classify(frame: Frame) -> InboundAction {
    match frame {
        Frame::Text(text) => match decode_control(&text) {
            Ok(ControlCommand::Resize(size)) => InboundAction::Resize(size),
            Err(_) => InboundAction::Ignore,
        },
        Frame::Binary(data) if !data.is_empty() => InboundAction::Input(data),
        Frame::Close => InboundAction::Close,
        Frame::Binary(_) | Frame::Ping(_) | Frame::Pong(_) => InboundAction::Ignore,
    }
}
