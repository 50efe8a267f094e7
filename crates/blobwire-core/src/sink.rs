//! Outbound interface to the storage collaborator.
//!
//! Completed assets leave the core through an `AssetSink`. Naming,
//! transcoding and durable storage are the sink's business.

use tokio::sync::mpsc;

/// Receives finished assets from the reassembly managers.
///
/// Callbacks run on the frame-processing path after the manager has
/// released its per-key lock, so a sink may call back into the core.
pub trait AssetSink: Send + Sync {
    /// A complete image arrived
    fn on_image_ready(&self, asset_key: &str, bytes: Vec<u8>);

    /// A recording was finalized with at least one complete blob
    fn on_video_ready(&self, asset_key: &str, mime_type: &str, bytes: Vec<u8>);

    /// A recording was finalized without any complete blob
    fn on_nothing_to_save(&self, _recording_id: &str, _asset_key: &str) {}
}

/// A finished asset as delivered by [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletedAsset {
    /// Reassembled image
    Image {
        /// Producer key
        asset_key: String,
        /// Image bytes
        bytes: Vec<u8>,
    },
    /// Finalized recording
    Video {
        /// Storage key
        asset_key: String,
        /// Container MIME type
        mime_type: String,
        /// Concatenated blob bytes
        bytes: Vec<u8>,
    },
    /// Recording that ended with nothing to save
    EmptyRecording {
        /// Recording identifier
        recording_id: String,
        /// Storage key
        asset_key: String,
    },
}

impl CompletedAsset {
    /// Storage key of the asset
    pub fn asset_key(&self) -> &str {
        match self {
            Self::Image { asset_key, .. }
            | Self::Video { asset_key, .. }
            | Self::EmptyRecording { asset_key, .. } => asset_key,
        }
    }
}

/// Sink that forwards every completed asset over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<CompletedAsset>,
}

impl ChannelSink {
    /// Create a sink and the receiver its assets arrive on
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<CompletedAsset>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, asset: CompletedAsset) {
        if self.tx.send(asset).is_err() {
            tracing::warn!("completed asset dropped: sink receiver is gone");
        }
    }
}

impl AssetSink for ChannelSink {
    fn on_image_ready(&self, asset_key: &str, bytes: Vec<u8>) {
        self.forward(CompletedAsset::Image {
            asset_key: asset_key.to_string(),
            bytes,
        });
    }

    fn on_video_ready(&self, asset_key: &str, mime_type: &str, bytes: Vec<u8>) {
        self.forward(CompletedAsset::Video {
            asset_key: asset_key.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        });
    }

    fn on_nothing_to_save(&self, recording_id: &str, asset_key: &str) {
        self.forward(CompletedAsset::EmptyRecording {
            recording_id: recording_id.to_string(),
            asset_key: asset_key.to_string(),
        });
    }
}
