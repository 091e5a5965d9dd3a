//! Framing error definitions.

use thiserror::Error;

/// Errors produced while encoding requests or decoding backend responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Frame code is not part of the response vocabulary.
    #[error("unknown frame code 0x{0:02x}")]
    UnknownFrame(u8),

    /// Status frame did not carry a valid 3-digit status.
    #[error("invalid status frame: {0}")]
    InvalidStatus(String),

    /// Frames arrived in an order the exchange does not allow.
    #[error("unexpected frame '{code}' while {context}")]
    UnexpectedFrame { code: char, context: &'static str },

    /// Header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Backend closed the channel before the exchange completed.
    #[error("backend closed connection {0}")]
    Truncated(&'static str),

    /// Socket read or write failed.
    #[error("backend i/o error: {0}")]
    Io(String),

    /// A request field does not fit in a single frame.
    #[error("{field} is {len} bytes, frame limit is {max}")]
    FrameTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },
}
