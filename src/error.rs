//! Error types
//!
//! Errors are split by the layer that raises them. Framing errors poison the
//! byte stream and close the connection, protocol errors reject a single
//! signal, and sink errors drop a single media frame.

use std::fmt;
use std::io;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket-level failure on read or write
    Io(io::Error),
    /// The byte stream could not be framed
    Framing(FramingError),
    /// A well-formed frame carried an invalid signal
    Protocol(ProtocolError),
    /// A durable append failed for one channel
    Sink(SinkError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "Transport error: {}", e),
            Error::Framing(e) => write!(f, "Framing error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Sink(e) => write!(f, "Sink error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Framing(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Sink(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<FramingError> for Error {
    fn from(e: FramingError) -> Self {
        Error::Framing(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<SinkError> for Error {
    fn from(e: SinkError) -> Self {
        Error::Sink(e)
    }
}

/// Errors raised while decoding or encoding the binary header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// Declared payload length is above the configured maximum
    PayloadTooLarge { declared: u32, max: u32 },
    /// Header version does not match the pinned profile version
    UnsupportedVersion(u8),
    /// Channel id does not fit the profile's channel width
    ChannelOutOfRange(u32),
    /// Header field value does not fit its bit width
    InvalidField(&'static str),
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::PayloadTooLarge { declared, max } => {
                write!(f, "declared payload {} exceeds maximum {}", declared, max)
            }
            FramingError::UnsupportedVersion(v) => write!(f, "unsupported header version {}", v),
            FramingError::ChannelOutOfRange(c) => {
                write!(f, "channel {} does not fit the header profile", c)
            }
            FramingError::InvalidField(name) => write!(f, "header field out of range: {}", name),
        }
    }
}

impl std::error::Error for FramingError {}

/// Errors raised while interpreting a signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload is not a valid signal envelope
    MalformedSignal(String),
    /// A required parameter is absent or empty
    MissingParameter {
        operation: &'static str,
        name: &'static str,
    },
    /// Signal requires a registered session
    NotRegistered {
        module: String,
        operation: String,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MalformedSignal(reason) => write!(f, "malformed signal: {}", reason),
            ProtocolError::MissingParameter { operation, name } => {
                write!(f, "{} is missing required parameter {}", operation, name)
            }
            ProtocolError::NotRegistered { module, operation } => {
                write!(f, "{}/{} received before CONNECT", module, operation)
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Errors raised by a channel sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Durable write queue is full, the frame was dropped
    Backlogged,
    /// Sink has been closed
    Closed,
    /// Artifact could not be opened
    Open(String),
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Backlogged => write!(f, "write queue full"),
            SinkError::Closed => write!(f, "sink closed"),
            SinkError::Open(reason) => write!(f, "failed to open artifact: {}", reason),
        }
    }
}

impl std::error::Error for SinkError {}
