//! Transport-level frames carried on the session channel.
//!
//! The session channel is message oriented (a WebSocket in practice). Each
//! message carries a transport type tag, and that tag is the first thing the
//! decoder looks at:
//!
//! - **Binary** frames carry raw terminal bytes in both directions.
//! - **Text** frames from the client may carry a control command.
//! - **Ping/Pong/Close** are transport housekeeping and never reach the shell.

/// Default terminal width used until the client sends a resize.
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal height used until the client sends a resize.
pub const DEFAULT_ROWS: u16 = 24;

/// One message on the session channel, tagged with its transport type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text message.
    Text(String),
    /// Binary message.
    Binary(Vec<u8>),
    /// Transport keepalive request.
    Ping(Vec<u8>),
    /// Transport keepalive response.
    Pong(Vec<u8>),
    /// The peer is closing the channel.
    Close,
}

impl Frame {
    /// Create a binary frame from anything that can become a byte vector.
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Frame::Binary(data.into())
    }

    /// Create a text frame.
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(text.into())
    }

    /// Returns true if this frame has no payload.
    pub fn is_empty(&self) -> bool {
        match self {
            Frame::Text(t) => t.is_empty(),
            Frame::Binary(b) | Frame::Ping(b) | Frame::Pong(b) => b.is_empty(),
            Frame::Close => true,
        }
    }

    /// Returns true for a close frame.
    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close)
    }
}

/// Terminal dimensions in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalSize {
    /// Width in columns.
    pub cols: u16,
    /// Height in rows.
    pub rows: u16,
}

impl TerminalSize {
    /// Create a new size.
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
        }
    }
}
