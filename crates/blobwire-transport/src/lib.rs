//! # BLOBWIRE Transport
//!
//! Message channel layer for the BLOBWIRE protocol.
//!
//! This crate provides:
//! - The `MessageChannel` / `MessageSource` traits the protocol core sends
//!   frames through and receives frames from
//! - Buffered-amount accounting used for sender backpressure
//! - An in-process channel pair for loopback transfers and tests
//!
//! Establishing the underlying connection (signalling, path discovery,
//! session negotiation) is the host's job; the core is handed an already
//! open channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod transport;

pub use memory::{MemoryChannel, MemoryReceiver, memory_channel, memory_channel_with_limit};
pub use transport::{
    MessageChannel, MessageSource, TransportError, TransportResult, TransportStats,
};

/// Label of the logical channel carrying image frames
pub const IMAGE_CHANNEL_LABEL: &str = "image";

/// Label of the logical channel carrying video frames
pub const VIDEO_CHANNEL_LABEL: &str = "video";
