//! Error types for the protocol crate.

use thiserror::Error;

/// Reasons a text frame was not accepted as a control command.
///
/// These never reach the client: the session drops the frame and carries on.
/// They exist so the decision is testable and loggable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    /// The payload does not start with the command marker.
    #[error("payload is not a control command")]
    NotACommand,

    /// The payload starts like a command but is not valid JSON of the
    /// expected shape.
    #[error("malformed control command: {0}")]
    Malformed(String),

    /// The command type is not one this server understands.
    #[error("unknown control command type: {0}")]
    UnknownType(String),

    /// A resize carried a missing, non-positive or out-of-range dimension.
    #[error("invalid terminal dimensions: cols={cols:?}, rows={rows:?}")]
    InvalidDimensions {
        /// Columns as sent by the client.
        cols: Option<i64>,
        /// Rows as sent by the client.
        rows: Option<i64>,
    },
}

/// Result type alias for control decoding.
pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ControlError::InvalidDimensions {
            cols: Some(0),
            rows: Some(24),
        };
        assert_eq!(
            err.to_string(),
            "invalid terminal dimensions: cols=Some(0), rows=Some(24)"
        );
        assert_eq!(
            ControlError::UnknownType("paste".into()).to_string(),
            "unknown control command type: paste"
        );
    }
}
