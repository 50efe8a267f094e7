//! # BLOBWIRE Core
//!
//! Chunked transfer protocol for moving large binary assets (still images and
//! incrementally recorded video) over a message channel that only delivers
//! discrete messages of limited size.
//!
//! This crate provides:
//! - Frame encoding and decoding (fixed JSON header, zero-copy payload)
//! - Index-addressed chunk reassembly
//! - A sender-side chunk pump with buffered-amount backpressure
//! - Image transfer and video recording session managers
//! - A channel adapter routing inbound frames to the managers
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  frames   ┌────────────────┐           ┌──────────────────┐
//! │  ChunkPump   │ ────────► │ MessageChannel │ ────────► │  ChannelAdapter  │
//! │ (backpressure│           │ image | video  │           └────────┬─────────┘
//! │   polling)   │           └────────────────┘                    │
//! └──────────────┘                                   ┌─────────────┴─────────────┐
//!                                                    ▼                           ▼
//!                                          ┌──────────────────┐     ┌────────────────────┐
//!                                          │  ImageTransfers  │     │  RecordingManager  │
//!                                          │  (one per key)   │     │ (blobs per session)│
//!                                          └────────┬─────────┘     └─────────┬──────────┘
//!                                                   └────────► AssetSink ◄────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod error;
pub mod frame;
pub mod image;
pub mod pump;
pub mod reassembly;
pub mod recording;
pub mod sink;

pub use channel::{AdapterStats, ChannelAdapter, ChannelKind};
pub use config::TransferConfig;
pub use error::{ConfigError, Error, FrameError, PumpError, Result};
pub use frame::{
    Frame, FrameHeader, ImageHeader, VideoAction, VideoActionKind, VideoHeader, decode_frame,
    encode_frame, encode_header,
};
pub use image::{ImageOutcome, ImageTransfers};
pub use pump::{AssetKind, ChunkPump, PumpConfig, RecordingInfo, RecordingStream};
pub use reassembly::{ChunkReassembler, ChunkStatus};
pub use recording::{RecordingManager, RecordingOutcome, RecordingSession, RecordingState};
pub use sink::{AssetSink, ChannelSink, CompletedAsset};

/// Fixed header size of image frames in bytes
pub const IMAGE_HEADER_SIZE: usize = 64;

/// Fixed header size of video frames in bytes
pub const VIDEO_HEADER_SIZE: usize = 256;

/// Nominal chunk payload size (16 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Largest accepted chunk payload size (1 MiB)
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Default backpressure mark for image frames (256 KiB)
pub const DEFAULT_IMAGE_HIGH_WATER_MARK: usize = 256 * 1024;

/// Default backpressure mark for video frames (1 MiB)
pub const DEFAULT_VIDEO_HIGH_WATER_MARK: usize = 1024 * 1024;

/// Default buffered-amount poll interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 20;
