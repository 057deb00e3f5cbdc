//! Error types for the WebSocket engine.
//!
//! Every failure the engine can observe is a variant of [`Error`]. Fatal
//! variants map onto an RFC 6455 close code through [`Error::close_code`];
//! usage errors such as [`Error::NotOpen`] leave the connection untouched.

use thiserror::Error;

use crate::connection::ConnectionState;
use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Reserved bits set without negotiated extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(u64),

    /// Unmasked frame received by a server.
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked frame received by a client.
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Declared payload length is above what the decoder accepts.
    #[error("Payload length {size} exceeds decoder ceiling {max}")]
    PayloadTooLarge {
        /// Declared length.
        size: u64,
        /// Largest accepted length.
        max: u64,
    },

    /// Protocol violation detected (e.g. interleaved fragmented messages).
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Reassembled message exceeds the configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Accumulated size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Receive buffer grew beyond the configured ceiling.
    #[error("Receive buffer overflow: {size} bytes buffered (max: {max})")]
    BufferOverflow {
        /// Bytes currently buffered.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake head grew beyond the configured ceiling.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes buffered so far.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Header value would break the HTTP head (CR/LF injection).
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Operation requires an open connection.
    #[error("Connection is not open (state: {0})")]
    NotOpen(ConnectionState),

    /// A streamed binary message is still being sent.
    #[error("A binary stream is already in progress")]
    StreamInProgress,

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Close code used when this error terminates an open connection.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Error::MessageTooLarge { .. }
            | Error::BufferOverflow { .. }
            | Error::HandshakeTooLarge { .. } => CloseCode::MessageTooBig,
            Error::InvalidUtf8 => CloseCode::InvalidPayload,
            _ => CloseCode::ProtocolError,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(_: std::string::FromUtf8Error) -> Self {
        Error::InvalidUtf8
    }
}
