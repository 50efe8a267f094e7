//! Receive-side glue between the transport and the session managers.
//!
//! Two logical channels carry frames: `"image"` and `"video"`. The adapter
//! routes each inbound message to the matching manager, drops malformed
//! frames, and tears a manager down when its channel closes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use blobwire_transport::{IMAGE_CHANNEL_LABEL, MessageSource, VIDEO_CHANNEL_LABEL};
use tracing::{debug, info, warn};

use crate::image::{ImageOutcome, ImageTransfers};
use crate::recording::{RecordingManager, RecordingOutcome};
use crate::sink::AssetSink;

/// Logical channel a frame arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Image frames
    Image,
    /// Video frames
    Video,
}

impl ChannelKind {
    /// Map a channel label to its kind
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            IMAGE_CHANNEL_LABEL => Some(Self::Image),
            VIDEO_CHANNEL_LABEL => Some(Self::Video),
            _ => None,
        }
    }

    /// Channel label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Image => IMAGE_CHANNEL_LABEL,
            Self::Video => VIDEO_CHANNEL_LABEL,
        }
    }
}

/// Adapter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterStats {
    /// Messages received on either channel
    pub frames_received: u64,
    /// Messages dropped as malformed
    pub frames_malformed: u64,
    /// Images delivered to the sink
    pub images_completed: u64,
    /// Recordings finalized (with or without output)
    pub recordings_finalized: u64,
}

#[derive(Debug, Default)]
struct Counters {
    frames_received: AtomicU64,
    frames_malformed: AtomicU64,
    images_completed: AtomicU64,
    recordings_finalized: AtomicU64,
}

/// Routes inbound frames to the image and recording managers
pub struct ChannelAdapter {
    images: ImageTransfers,
    recordings: RecordingManager,
    counters: Counters,
}

impl ChannelAdapter {
    /// Create an adapter whose managers deliver to `sink`
    pub fn new(sink: Arc<dyn AssetSink>) -> Self {
        Self {
            images: ImageTransfers::new(Arc::clone(&sink)),
            recordings: RecordingManager::new(sink),
            counters: Counters::default(),
        }
    }

    /// Image session manager
    pub fn images(&self) -> &ImageTransfers {
        &self.images
    }

    /// Recording session manager
    pub fn recordings(&self) -> &RecordingManager {
        &self.recordings
    }

    /// Handle one inbound message. Returns `false` if it was dropped as
    /// malformed.
    pub fn on_message(&self, kind: ChannelKind, message: &[u8]) -> bool {
        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);

        let result = match kind {
            ChannelKind::Image => self.images.on_frame(message).map(|outcome| {
                if matches!(outcome, ImageOutcome::Completed { .. }) {
                    self.counters.images_completed.fetch_add(1, Ordering::Relaxed);
                }
            }),
            ChannelKind::Video => self.recordings.on_frame(message).map(|outcome| {
                if matches!(
                    outcome,
                    RecordingOutcome::Finalized { .. } | RecordingOutcome::NothingToSave
                ) {
                    self.counters
                        .recordings_finalized
                        .fetch_add(1, Ordering::Relaxed);
                }
            }),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.counters.frames_malformed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    channel = kind.label(),
                    len = message.len(),
                    error = %e,
                    "dropping malformed frame"
                );
                false
            }
        }
    }

    /// Tear down the manager behind a closed channel.
    ///
    /// Closing the video channel finalizes every live recording with its
    /// complete blobs; closing the image channel discards partial images.
    pub fn on_channel_closed(&self, kind: ChannelKind) {
        match kind {
            ChannelKind::Image => {
                let dropped = self.images.clear();
                info!(channel = kind.label(), dropped, "image channel closed");
            }
            ChannelKind::Video => {
                let finalized = self.recordings.teardown();
                self.counters
                    .recordings_finalized
                    .fetch_add(finalized as u64, Ordering::Relaxed);
                info!(channel = kind.label(), finalized, "video channel closed");
            }
        }
    }

    /// Dispatch every message from `source` until it ends, then tear down.
    ///
    /// Returns the number of messages handled.
    pub async fn serve<S: MessageSource + ?Sized>(&self, kind: ChannelKind, source: &mut S) -> u64 {
        debug!(channel = kind.label(), "serving channel");

        let mut handled = 0;
        while let Some(message) = source.recv().await {
            self.on_message(kind, &message);
            handled += 1;
        }

        self.on_channel_closed(kind);
        handled
    }

    /// Snapshot of the adapter counters
    pub fn stats(&self) -> AdapterStats {
        AdapterStats {
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
            frames_malformed: self.counters.frames_malformed.load(Ordering::Relaxed),
            images_completed: self.counters.images_completed.load(Ordering::Relaxed),
            recordings_finalized: self.counters.recordings_finalized.load(Ordering::Relaxed),
        }
    }
}
