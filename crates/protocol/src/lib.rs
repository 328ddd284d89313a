//! # Workstation Protocol Library
//!
//! Wire types for the interactive session channel between the browser
//! terminal and the workstation backend.
//!
//! ## Overview
//!
//! The session channel is a single persistent message stream that carries
//! both raw terminal bytes and out-of-band control commands:
//!
//! ```text
//! client ──binary──▶ keystrokes            ──▶ pty
//! client ──text────▶ {"type":"resize",...} ──▶ pty size
//! client ◀─binary─── banner, shell output  ◀── pty
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{classify, Frame, InboundAction, TerminalSize};
//!
//! let frame = Frame::text(r#"{"type":"resize","cols":120,"rows":40}"#);
//! assert_eq!(classify(frame), InboundAction::Resize(TerminalSize::new(120, 40)));
//!
//! let frame = Frame::binary(b"ls\n".to_vec());
//! assert_eq!(classify(frame), InboundAction::Input(b"ls\n".to_vec()));
//! ```
//!
//! ## Modules
//!
//! - [`framing`]: Transport frames and terminal dimensions
//! - [`control`]: Control command decoding and frame classification
//! - [`error`]: Error types

pub mod control;
pub mod error;
pub mod framing;

pub use control::{
    classify, decode_control, is_command_candidate, ControlCommand, InboundAction,
    COMMAND_MARKER, RESIZE_TYPE,
};
pub use error::{ControlError, Result};
pub use framing::{Frame, TerminalSize, DEFAULT_COLS, DEFAULT_ROWS};
