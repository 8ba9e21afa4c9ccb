//! Error types
//!
//! A single error enum covers the whole relay core. Codec parsers report the
//! narrower [`MediaError`], which surfaces as [`Error::MalformedInput`].

use thiserror::Error as ThisError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for relay core operations
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// Wire payload could not be parsed into a packet
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Packet header names a format the muxer cannot encode
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Duplicate publisher or duplicate relay session key
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation on an absent stream or session
    #[error("not found: {0}")]
    NotFound(String),

    /// Sink cannot keep up with the publisher
    #[error("slow consumer")]
    SlowConsumer,

    /// Liveness window elapsed without activity
    #[error("timeout")]
    Timeout,

    /// Transport went away underneath the endpoint
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// Source was closed deliberately
    #[error("end of stream")]
    EndOfStream,

    /// Sink rejected the encoded bytes
    #[error("write failure: {0}")]
    WriteFailure(String),

    /// Operation on a closed endpoint
    #[error("closed")]
    Closed,

    /// Operator supplied a missing or invalid parameter
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl Error {
    /// Whether a subscriber failing with this error must be evicted from fan-out
    pub fn evicts_subscriber(&self) -> bool {
        matches!(
            self,
            Error::SlowConsumer
                | Error::Closed
                | Error::Timeout
                | Error::Disconnected(_)
                | Error::WriteFailure(_)
                | Error::EndOfStream
        )
    }

    /// Whether this error marks a deliberate end of the stream
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::EndOfStream)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::WriteFailure(err.to_string())
    }
}

/// Codec-level parse errors
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum MediaError {
    #[error("invalid AAC packet")]
    InvalidAacPacket,
    #[error("invalid AVC packet")]
    InvalidAvcPacket,
    #[error("truncated tag: need {needed} bytes, have {available}")]
    TruncatedTag { needed: usize, available: usize },
    #[error("unknown tag type {0:#04x}")]
    UnknownTagType(u8),
    #[error("AAC sequence header not received yet")]
    MissingAacConfig,
}

impl From<MediaError> for Error {
    fn from(err: MediaError) -> Self {
        Error::MalformedInput(err.to_string())
    }
}
