//! Chunk reassembly.
//!
//! A `ChunkReassembler` accumulates the chunks of one in-flight asset (an
//! image, or one blob of a recording) in index-addressed slots and turns them
//! back into contiguous bytes once every slot is filled. Slots are keyed by
//! chunk index, so delivery order does not matter.

use std::collections::BTreeMap;

/// Result of offering a chunk to a reassembler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Slot was empty and is now filled
    Accepted,
    /// Slot was already filled; nothing changed
    Duplicate,
    /// Index is outside `[0, total_chunks)`; nothing changed
    OutOfRange,
}

/// Accumulates the chunks of one asset
#[derive(Debug, Clone)]
pub struct ChunkReassembler {
    total_chunks: u32,
    slots: BTreeMap<u32, Vec<u8>>,
    buffered_bytes: usize,
}

impl ChunkReassembler {
    /// Create a reassembler expecting `total_chunks` chunks
    #[must_use]
    pub fn new(total_chunks: u32) -> Self {
        Self {
            total_chunks,
            slots: BTreeMap::new(),
            buffered_bytes: 0,
        }
    }

    /// Offer one chunk.
    ///
    /// Each slot is written at most once; later writes to the same index are
    /// ignored, as are indices the asset does not have.
    pub fn add_chunk(&mut self, index: u32, bytes: &[u8]) -> ChunkStatus {
        if index >= self.total_chunks {
            return ChunkStatus::OutOfRange;
        }
        if self.slots.contains_key(&index) {
            return ChunkStatus::Duplicate;
        }

        self.buffered_bytes += bytes.len();
        self.slots.insert(index, bytes.to_vec());
        ChunkStatus::Accepted
    }

    /// Check if every chunk has arrived
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }

    /// Number of chunks the asset was split into
    #[must_use]
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Number of distinct chunks received
    #[must_use]
    pub fn received_count(&self) -> u32 {
        // Bounded by total_chunks, which is a u32.
        self.slots.len() as u32
    }

    /// Sum of the lengths of the filled slots
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Indices still missing, ascending
    #[must_use]
    pub fn missing_chunks(&self) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.slots.contains_key(i))
            .collect()
    }

    /// Concatenate the filled slots in ascending index order.
    ///
    /// Only meaningful once [`is_complete`](Self::is_complete) holds; on an
    /// incomplete reassembler the gaps are simply skipped.
    #[must_use]
    pub fn materialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buffered_bytes);
        for chunk in self.slots.values() {
            out.extend_from_slice(chunk);
        }
        out
    }

    /// Consuming variant of [`materialize`](Self::materialize)
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut slots = self.slots.into_values();
        let Some(mut out) = slots.next() else {
            return Vec::new();
        };
        out.reserve_exact(self.buffered_bytes - out.len());
        for chunk in slots {
            out.extend_from_slice(&chunk);
        }
        out
    }
}
