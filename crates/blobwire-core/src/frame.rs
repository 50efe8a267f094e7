//! Frame encoding and decoding for the BLOBWIRE wire protocol.
//!
//! A frame is a fixed-size header region followed by raw payload bytes:
//!
//! ```text
//! ┌──────────────────────────────────────┬───────────────────────┐
//! │ header JSON ++ 0x00 padding (N bytes) │ payload (frame len-N) │
//! └──────────────────────────────────────┴───────────────────────┘
//! ```
//!
//! N is a per-kind protocol constant: 64 bytes for image frames and
//! 256 bytes for video frames. Parsing borrows the payload from the
//! message buffer; nothing past the end of the message is ever read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::{IMAGE_HEADER_SIZE, VIDEO_HEADER_SIZE};

/// Metadata header carried at the front of every frame of one kind.
pub trait FrameHeader: Serialize + DeserializeOwned {
    /// Fixed size of the header region in bytes
    const HEADER_SIZE: usize;

    /// Reject headers that parse but cannot be acted on.
    fn validate(&self) -> Result<(), FrameError> {
        Ok(())
    }
}

/// Header of an image frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHeader {
    /// Producer-chosen key, one in-flight image per key
    pub asset_key: String,
    /// Index of this chunk within the image
    pub chunk_index: u32,
    /// Number of chunks the image was split into
    pub total_chunks: u32,
}

impl ImageHeader {
    /// Create an image header
    pub fn new(asset_key: impl Into<String>, chunk_index: u32, total_chunks: u32) -> Self {
        Self {
            asset_key: asset_key.into(),
            chunk_index,
            total_chunks,
        }
    }
}

impl FrameHeader for ImageHeader {
    const HEADER_SIZE: usize = IMAGE_HEADER_SIZE;

    fn validate(&self) -> Result<(), FrameError> {
        if self.asset_key.is_empty() {
            return Err(FrameError::InvalidHeader("assetKey is empty"));
        }
        if self.total_chunks == 0 {
            return Err(FrameError::InvalidHeader("totalChunks is zero"));
        }
        Ok(())
    }
}

/// Wire tag of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoActionKind {
    /// Open a recording session
    Start,
    /// One chunk of one blob
    Data,
    /// Finalize a recording session
    Stop,
}

impl VideoActionKind {
    /// Wire string of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Data => "data",
            Self::Stop => "stop",
        }
    }
}

/// Header of a video frame.
///
/// Every field is written by the sender; fields an action does not use are
/// empty or zero and may be omitted by other producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoHeader {
    /// Action tag
    pub action: VideoActionKind,
    /// Recording this frame belongs to
    pub recording_id: String,
    /// Storage key of the finished recording
    #[serde(default)]
    pub asset_key: String,
    /// Container MIME type of the recording
    #[serde(default)]
    pub mime_type: String,
    /// Index of this chunk within its blob
    #[serde(default)]
    pub chunk_index: u32,
    /// Number of chunks the blob was split into
    #[serde(default)]
    pub total_chunks: u32,
    /// Index of the blob within the recording
    #[serde(default)]
    pub blob_index: u32,
}

impl VideoHeader {
    /// Header opening a recording
    pub fn start(recording_id: &str, asset_key: &str, mime_type: &str) -> Self {
        Self {
            action: VideoActionKind::Start,
            recording_id: recording_id.to_string(),
            asset_key: asset_key.to_string(),
            mime_type: mime_type.to_string(),
            chunk_index: 0,
            total_chunks: 0,
            blob_index: 0,
        }
    }

    /// Header of one chunk of one blob
    pub fn data(
        recording_id: &str,
        asset_key: &str,
        mime_type: &str,
        blob_index: u32,
        chunk_index: u32,
        total_chunks: u32,
    ) -> Self {
        Self {
            action: VideoActionKind::Data,
            recording_id: recording_id.to_string(),
            asset_key: asset_key.to_string(),
            mime_type: mime_type.to_string(),
            chunk_index,
            total_chunks,
            blob_index,
        }
    }

    /// Header closing a recording
    pub fn stop(recording_id: &str) -> Self {
        Self {
            action: VideoActionKind::Stop,
            recording_id: recording_id.to_string(),
            asset_key: String::new(),
            mime_type: String::new(),
            chunk_index: 0,
            total_chunks: 0,
            blob_index: 0,
        }
    }
}

impl FrameHeader for VideoHeader {
    const HEADER_SIZE: usize = VIDEO_HEADER_SIZE;

    fn validate(&self) -> Result<(), FrameError> {
        if self.recording_id.is_empty() {
            return Err(FrameError::InvalidHeader("recordingId is empty"));
        }
        if self.action == VideoActionKind::Data && self.total_chunks == 0 {
            return Err(FrameError::InvalidHeader("totalChunks is zero"));
        }
        Ok(())
    }
}

/// Decoded video frame, one variant per action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoAction<'a> {
    /// Open (or reopen) a recording
    Start {
        /// Recording identifier
        recording_id: String,
        /// Storage key of the finished recording
        asset_key: String,
        /// Container MIME type
        mime_type: String,
    },
    /// Deliver one chunk of one blob
    Data {
        /// Recording identifier
        recording_id: String,
        /// Blob the chunk belongs to
        blob_index: u32,
        /// Chunk index within the blob
        chunk_index: u32,
        /// Chunk count of the blob
        total_chunks: u32,
        /// Chunk bytes, borrowed from the frame
        payload: &'a [u8],
    },
    /// Finalize a recording
    Stop {
        /// Recording identifier
        recording_id: String,
    },
}

impl<'a> VideoAction<'a> {
    /// Parse a video frame straight into its action.
    pub fn decode(data: &'a [u8]) -> Result<Self, FrameError> {
        Frame::<VideoHeader>::parse(data).map(Self::from)
    }

    /// Recording the action refers to
    pub fn recording_id(&self) -> &str {
        match self {
            Self::Start { recording_id, .. }
            | Self::Data { recording_id, .. }
            | Self::Stop { recording_id } => recording_id,
        }
    }
}

impl<'a> From<Frame<'a, VideoHeader>> for VideoAction<'a> {
    fn from(frame: Frame<'a, VideoHeader>) -> Self {
        let payload = frame.payload;
        let header = frame.header;
        match header.action {
            VideoActionKind::Start => Self::Start {
                recording_id: header.recording_id,
                asset_key: header.asset_key,
                mime_type: header.mime_type,
            },
            VideoActionKind::Data => Self::Data {
                recording_id: header.recording_id,
                blob_index: header.blob_index,
                chunk_index: header.chunk_index,
                total_chunks: header.total_chunks,
                payload,
            },
            VideoActionKind::Stop => Self::Stop {
                recording_id: header.recording_id,
            },
        }
    }
}

/// Parsed frame: typed header plus a payload view into the message buffer
#[derive(Debug)]
pub struct Frame<'a, H> {
    header: H,
    payload: &'a [u8],
}

impl<'a, H: FrameHeader> Frame<'a, H> {
    /// Parse a frame from raw bytes (zero-copy payload)
    pub fn parse(data: &'a [u8]) -> Result<Self, FrameError> {
        if data.len() < H::HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: H::HEADER_SIZE,
                actual: data.len(),
            });
        }

        let (region, payload) = data.split_at(H::HEADER_SIZE);
        let end = region
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |last| last + 1);

        let json = std::str::from_utf8(&region[..end])
            .map_err(|_| FrameError::MalformedHeader("header is not valid UTF-8".to_string()))?;
        let header: H =
            serde_json::from_str(json).map_err(|e| FrameError::MalformedHeader(e.to_string()))?;
        header.validate()?;

        Ok(Self { header, payload })
    }

    /// Get the header
    pub fn header(&self) -> &H {
        &self.header
    }

    /// Get the payload slice (zero-copy)
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Split into header and payload
    pub fn into_parts(self) -> (H, &'a [u8]) {
        (self.header, self.payload)
    }
}

/// Serialize a header into its zero-padded fixed-size region.
///
/// # Errors
///
/// Returns `FrameError::HeaderOverflow` if the JSON does not fit.
pub fn encode_header<H: FrameHeader>(header: &H) -> Result<Vec<u8>, FrameError> {
    let mut region =
        serde_json::to_vec(header).map_err(|e| FrameError::MalformedHeader(e.to_string()))?;

    if region.len() > H::HEADER_SIZE {
        return Err(FrameError::HeaderOverflow {
            size: region.len(),
            max: H::HEADER_SIZE,
        });
    }

    region.resize(H::HEADER_SIZE, 0);
    Ok(region)
}

/// Build a complete frame: padded header followed by the payload.
///
/// # Errors
///
/// Returns `FrameError::HeaderOverflow` if the header JSON does not fit.
pub fn encode_frame<H: FrameHeader>(header: &H, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut frame = encode_header(header)?;
    frame.reserve_exact(payload.len());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Decode a frame into an owned header and a borrowed payload.
///
/// # Errors
///
/// Returns a malformed-frame error (see [`FrameError::is_malformed`]).
pub fn decode_frame<H: FrameHeader>(data: &[u8]) -> Result<(H, &[u8]), FrameError> {
    Frame::<H>::parse(data).map(Frame::into_parts)
}
