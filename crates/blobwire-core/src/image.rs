//! Image transfer sessions.
//!
//! Each producer key (typically one per camera) has at most one image in
//! flight. A chunk with index 0 always starts a new image for its key and
//! throws away whatever partial image the key had; there is no separate
//! abort message.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::{Entry, OccupiedEntry};
use tracing::{debug, info};

use crate::error::FrameError;
use crate::frame::{Frame, ImageHeader};
use crate::reassembly::{ChunkReassembler, ChunkStatus};
use crate::sink::AssetSink;

/// What a single image chunk did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Chunk stored; the image is still incomplete
    Pending {
        /// Chunks received so far
        received: u32,
        /// Chunks expected
        total: u32,
    },
    /// Chunk index already filled
    Duplicate,
    /// Chunk index beyond the image's chunk count
    OutOfRange,
    /// Image completed and handed to the sink
    Completed {
        /// Producer key
        asset_key: String,
        /// Image size in bytes
        len: usize,
    },
}

/// Tracks the in-flight image of every producer key
pub struct ImageTransfers {
    assemblies: DashMap<String, ChunkReassembler>,
    sink: Arc<dyn AssetSink>,
}

impl ImageTransfers {
    /// Create an empty session table delivering to `sink`
    pub fn new(sink: Arc<dyn AssetSink>) -> Self {
        Self {
            assemblies: DashMap::new(),
            sink,
        }
    }

    /// Decode one image frame and apply it.
    ///
    /// # Errors
    ///
    /// Returns the decode error for a malformed frame; no state changes.
    pub fn on_frame(&self, frame: &[u8]) -> Result<ImageOutcome, FrameError> {
        let frame = Frame::<ImageHeader>::parse(frame)?;
        Ok(self.on_chunk(frame.header(), frame.payload()))
    }

    /// Apply one decoded chunk.
    ///
    /// The chunk is stored, checked for completion and, when complete,
    /// removed from the table under a single entry lock. The sink runs after
    /// the lock is released.
    pub fn on_chunk(&self, header: &ImageHeader, payload: &[u8]) -> ImageOutcome {
        let key = header.asset_key.as_str();
        let mut entry =
            self.begin_or_resume(key, header.total_chunks, header.chunk_index == 0);

        let assembly = entry.get_mut();
        let status = assembly.add_chunk(header.chunk_index, payload);
        let received = assembly.received_count();
        let total = assembly.total_chunks();

        match status {
            ChunkStatus::OutOfRange => {
                // Nothing stored yet: don't keep an empty transfer alive.
                if received == 0 {
                    entry.remove();
                } else {
                    drop(entry);
                }
                debug!(
                    asset_key = key,
                    chunk_index = header.chunk_index,
                    total_chunks = total,
                    "dropping out-of-range image chunk"
                );
                return ImageOutcome::OutOfRange;
            }
            ChunkStatus::Duplicate => {
                drop(entry);
                debug!(
                    asset_key = key,
                    chunk_index = header.chunk_index,
                    "ignoring duplicate image chunk"
                );
                return ImageOutcome::Duplicate;
            }
            ChunkStatus::Accepted => {}
        }

        if received < total {
            return ImageOutcome::Pending { received, total };
        }

        let (asset_key, assembly) = entry.remove_entry();
        let bytes = assembly.into_bytes();
        let len = bytes.len();
        info!(
            asset_key = %asset_key,
            bytes = len,
            chunks = total,
            "image transfer complete"
        );
        self.sink.on_image_ready(&asset_key, bytes);

        ImageOutcome::Completed { asset_key, len }
    }

    /// Find the reassembler for `asset_key`, creating it if needed.
    ///
    /// When `is_first_chunk` is set any existing reassembler for the key is
    /// replaced by a fresh one sized to `total_chunks`, discarding its
    /// partial data. Otherwise an existing reassembler is reused as-is and
    /// `total_chunks` only sizes a newly created one.
    ///
    /// The returned entry holds the key's lock until dropped.
    pub fn begin_or_resume(
        &self,
        asset_key: &str,
        total_chunks: u32,
        is_first_chunk: bool,
    ) -> OccupiedEntry<'_, String, ChunkReassembler> {
        match self.assemblies.entry(asset_key.to_string()) {
            Entry::Occupied(mut existing) => {
                if is_first_chunk {
                    let discarded = existing.insert(ChunkReassembler::new(total_chunks));
                    if discarded.received_count() > 0 {
                        debug!(
                            asset_key,
                            discarded_chunks = discarded.received_count(),
                            expected_chunks = discarded.total_chunks(),
                            "new image started, discarding partial transfer"
                        );
                    }
                }
                existing
            }
            Entry::Vacant(vacant) => vacant.insert_entry(ChunkReassembler::new(total_chunks)),
        }
    }

    /// Number of keys with an image in flight
    pub fn in_flight(&self) -> usize {
        self.assemblies.len()
    }

    /// `(received, total)` chunk counts of the image in flight for a key
    pub fn progress(&self, asset_key: &str) -> Option<(u32, u32)> {
        self.assemblies
            .get(asset_key)
            .map(|a| (a.received_count(), a.total_chunks()))
    }

    /// Discard every partial image, returning how many were dropped
    pub fn clear(&self) -> usize {
        let dropped = self.assemblies.len();
        self.assemblies.clear();
        if dropped > 0 {
            debug!(dropped, "discarded partial image transfers");
        }
        dropped
    }
}
