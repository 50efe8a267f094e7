//! Error types for the BLOBWIRE core protocol.

use blobwire_transport::TransportError;
use thiserror::Error;

/// Core protocol errors
#[derive(Debug, Error)]
pub enum Error {
    /// Frame encoding or decoding error
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Sender error
    #[error("pump error: {0}")]
    Pump(#[from] PumpError),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Frame-level errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame too short to hold its fixed header
    #[error("frame too short: expected at least {expected}, got {actual}")]
    TooShort {
        /// Expected minimum size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Header bytes do not parse as the expected schema
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Header parsed but carries values the protocol cannot use
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// Serialized header does not fit the fixed header region
    #[error("header overflow: {size} bytes exceeds the {max}-byte header")]
    HeaderOverflow {
        /// Serialized header size
        size: usize,
        /// Fixed header size for the frame kind
        max: usize,
    },
}

impl FrameError {
    /// True for receive-side conditions where the frame is dropped.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::HeaderOverflow { .. })
    }
}

/// Sender-side errors
#[derive(Debug, Error)]
pub enum PumpError {
    /// Frame could not be built (header overflow)
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Channel rejected a send or closed mid-transfer
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Asset has no bytes to send
    #[error("refusing to send an empty asset")]
    EmptyAsset,

    /// Asset needs more chunks than the header can index
    #[error("asset of {len} bytes needs more than u32::MAX chunks")]
    TooManyChunks {
        /// Asset length in bytes
        len: usize,
    },
}

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Chunk size outside the supported range
    #[error("chunk size must be between 1 and {max} bytes, got {actual}")]
    InvalidChunkSize {
        /// Requested chunk size
        actual: usize,
        /// Largest supported chunk size
        max: usize,
    },

    /// High-water mark of zero would stall the sender forever
    #[error("{kind} high-water mark must be greater than zero")]
    InvalidHighWaterMark {
        /// Asset kind the mark applies to
        kind: &'static str,
    },

    /// Poll interval of zero would busy-loop
    #[error("backpressure poll interval must be greater than zero")]
    InvalidPollInterval,
}
