//! Video recording sessions.
//!
//! A recording arrives as a sequence of blobs, each split into chunks. Every
//! blob is reassembled independently; completed blobs are kept by index and
//! concatenated in ascending index order when the recording is finalized.
//!
//! ```text
//!   start ──► Recording ──(data)*──► Recording ──stop/teardown──► Finalized
//! ```

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::FrameError;
use crate::frame::VideoAction;
use crate::reassembly::{ChunkReassembler, ChunkStatus};
use crate::sink::AssetSink;

/// Recording session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Accepting data chunks
    Recording,
    /// Output emitted; no further data accepted
    Finalized,
}

/// What a single video action did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Session opened
    Started {
        /// A live session with the same id was discarded
        replaced: bool,
    },
    /// Chunk stored; its blob is still incomplete
    ChunkAccepted {
        /// Blob the chunk belongs to
        blob_index: u32,
        /// Chunks of the blob received so far
        received: u32,
        /// Chunks the blob was split into
        total: u32,
    },
    /// Chunk completed its blob
    BlobCompleted {
        /// Completed blob
        blob_index: u32,
        /// Blob size in bytes
        len: usize,
    },
    /// Chunk index already filled
    Duplicate,
    /// Chunk index beyond the blob's chunk count
    OutOfRange,
    /// Chunk for a blob that already completed
    BlobAlreadyComplete,
    /// No live session with that id
    UnknownRecording,
    /// Session finalized and its output emitted
    Finalized {
        /// Output size in bytes
        len: usize,
        /// Number of blobs included
        blob_count: usize,
    },
    /// Session finalized with no complete blob
    NothingToSave,
}

/// State of one recording
#[derive(Debug)]
pub struct RecordingSession {
    recording_id: String,
    asset_key: String,
    mime_type: String,
    assembling: HashMap<u32, ChunkReassembler>,
    completed: BTreeMap<u32, Vec<u8>>,
    completed_bytes: usize,
    state: RecordingState,
}

impl RecordingSession {
    /// Open a session in the `Recording` state
    pub fn new(
        recording_id: impl Into<String>,
        asset_key: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            recording_id: recording_id.into(),
            asset_key: asset_key.into(),
            mime_type: mime_type.into(),
            assembling: HashMap::new(),
            completed: BTreeMap::new(),
            completed_bytes: 0,
            state: RecordingState::Recording,
        }
    }

    /// Recording identifier
    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }

    /// Storage key of the finished recording
    pub fn asset_key(&self) -> &str {
        &self.asset_key
    }

    /// Container MIME type
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Current state
    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Number of completed blobs
    pub fn completed_blobs(&self) -> usize {
        self.completed.len()
    }

    /// Number of blobs still being reassembled
    pub fn pending_blobs(&self) -> usize {
        self.assembling.len()
    }

    /// Sum of the completed blob lengths
    pub fn total_bytes(&self) -> usize {
        self.completed_bytes
    }

    /// Route one chunk to its blob's reassembler.
    pub fn add_chunk(
        &mut self,
        blob_index: u32,
        chunk_index: u32,
        total_chunks: u32,
        payload: &[u8],
    ) -> RecordingOutcome {
        if self.state != RecordingState::Recording {
            return RecordingOutcome::UnknownRecording;
        }
        if self.completed.contains_key(&blob_index) {
            return RecordingOutcome::BlobAlreadyComplete;
        }

        let mut blob = match self.assembling.entry(blob_index) {
            Entry::Occupied(blob) => blob,
            Entry::Vacant(slot) => slot.insert_entry(ChunkReassembler::new(total_chunks)),
        };

        let assembly = blob.get_mut();
        match assembly.add_chunk(chunk_index, payload) {
            ChunkStatus::OutOfRange => {
                if assembly.received_count() == 0 {
                    blob.remove();
                }
                return RecordingOutcome::OutOfRange;
            }
            ChunkStatus::Duplicate => return RecordingOutcome::Duplicate,
            ChunkStatus::Accepted => {}
        }

        if !assembly.is_complete() {
            return RecordingOutcome::ChunkAccepted {
                blob_index,
                received: assembly.received_count(),
                total: assembly.total_chunks(),
            };
        }

        let bytes = blob.remove().into_bytes();
        let len = bytes.len();
        self.completed_bytes += len;
        self.completed.insert(blob_index, bytes);

        RecordingOutcome::BlobCompleted { blob_index, len }
    }

    /// Move to `Finalized` and take the recording's bytes.
    ///
    /// Completed blobs are concatenated in ascending blob index order;
    /// incomplete blobs are dropped. Returns `None` when no blob completed,
    /// and on every call after the first.
    pub fn finalize(&mut self) -> Option<Vec<u8>> {
        self.state = RecordingState::Finalized;
        self.assembling.clear();

        let completed = std::mem::take(&mut self.completed);
        let total = std::mem::take(&mut self.completed_bytes);
        if completed.is_empty() {
            return None;
        }

        let mut out = Vec::with_capacity(total);
        for blob in completed.into_values() {
            out.extend_from_slice(&blob);
        }
        Some(out)
    }
}

/// Tracks every live recording and emits finalized output to the sink
pub struct RecordingManager {
    sessions: DashMap<String, RecordingSession>,
    sink: Arc<dyn AssetSink>,
}

impl RecordingManager {
    /// Create an empty session table delivering to `sink`
    pub fn new(sink: Arc<dyn AssetSink>) -> Self {
        Self {
            sessions: DashMap::new(),
            sink,
        }
    }

    /// Decode one video frame and apply it.
    ///
    /// # Errors
    ///
    /// Returns the decode error for a malformed frame; no state changes.
    pub fn on_frame(&self, frame: &[u8]) -> Result<RecordingOutcome, FrameError> {
        let action = VideoAction::decode(frame)?;
        Ok(self.apply(action))
    }

    /// Apply a decoded action
    pub fn apply(&self, action: VideoAction<'_>) -> RecordingOutcome {
        match action {
            VideoAction::Start {
                recording_id,
                asset_key,
                mime_type,
            } => self.start(&recording_id, &asset_key, &mime_type),
            VideoAction::Data {
                recording_id,
                blob_index,
                chunk_index,
                total_chunks,
                payload,
            } => self.data(&recording_id, blob_index, chunk_index, total_chunks, payload),
            VideoAction::Stop { recording_id } => self.stop(&recording_id),
        }
    }

    /// Open a recording. An existing session with the same id is discarded.
    pub fn start(&self, recording_id: &str, asset_key: &str, mime_type: &str) -> RecordingOutcome {
        let previous = self.sessions.insert(
            recording_id.to_string(),
            RecordingSession::new(recording_id, asset_key, mime_type),
        );

        if let Some(old) = &previous {
            debug!(
                recording_id,
                discarded_blobs = old.completed_blobs(),
                "recording restarted, discarding previous session"
            );
        }
        info!(recording_id, asset_key, mime_type, "recording started");

        RecordingOutcome::Started {
            replaced: previous.is_some(),
        }
    }

    /// Deliver one chunk of one blob
    pub fn data(
        &self,
        recording_id: &str,
        blob_index: u32,
        chunk_index: u32,
        total_chunks: u32,
        payload: &[u8],
    ) -> RecordingOutcome {
        let Some(mut session) = self.sessions.get_mut(recording_id) else {
            debug!(recording_id, blob_index, "data for unknown recording dropped");
            return RecordingOutcome::UnknownRecording;
        };

        let outcome = session.add_chunk(blob_index, chunk_index, total_chunks, payload);
        drop(session);

        match &outcome {
            RecordingOutcome::BlobCompleted { len, .. } => {
                debug!(recording_id, blob_index, bytes = len, "blob complete");
            }
            RecordingOutcome::OutOfRange => {
                debug!(
                    recording_id,
                    blob_index,
                    chunk_index,
                    total_chunks,
                    "dropping out-of-range video chunk"
                );
            }
            RecordingOutcome::Duplicate | RecordingOutcome::BlobAlreadyComplete => {
                debug!(recording_id, blob_index, chunk_index, "ignoring repeated video chunk");
            }
            _ => {}
        }

        outcome
    }

    /// Finalize and remove a recording. Unknown ids are a no-op.
    pub fn stop(&self, recording_id: &str) -> RecordingOutcome {
        match self.sessions.remove(recording_id) {
            Some((_, session)) => self.finish(session),
            None => {
                debug!(recording_id, "stop for unknown recording ignored");
                RecordingOutcome::UnknownRecording
            }
        }
    }

    /// Finalize every live recording with whatever blobs are complete.
    ///
    /// Returns the number of sessions finalized.
    pub fn teardown(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();

        let mut finalized = 0;
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                self.finish(session);
                finalized += 1;
            }
        }

        if finalized > 0 {
            info!(finalized, "recordings finalized on teardown");
        }
        finalized
    }

    /// Number of recordings in the `Recording` state
    pub fn live_recordings(&self) -> usize {
        self.sessions.len()
    }

    /// Completed blob count of a live recording
    pub fn completed_blobs(&self, recording_id: &str) -> Option<usize> {
        self.sessions.get(recording_id).map(|s| s.completed_blobs())
    }

    fn finish(&self, mut session: RecordingSession) -> RecordingOutcome {
        let blob_count = session.completed_blobs();
        let skipped = session.pending_blobs();

        match session.finalize() {
            Some(bytes) => {
                let len = bytes.len();
                info!(
                    recording_id = session.recording_id(),
                    asset_key = session.asset_key(),
                    blobs = blob_count,
                    skipped_blobs = skipped,
                    bytes = len,
                    "recording finalized"
                );
                self.sink
                    .on_video_ready(session.asset_key(), session.mime_type(), bytes);
                RecordingOutcome::Finalized { len, blob_count }
            }
            None => {
                info!(
                    recording_id = session.recording_id(),
                    asset_key = session.asset_key(),
                    "recording finalized with nothing to save"
                );
                self.sink
                    .on_nothing_to_save(session.recording_id(), session.asset_key());
                RecordingOutcome::NothingToSave
            }
        }
    }
}
