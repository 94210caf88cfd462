// src/acquisition/assembler.rs
//! Chunk assembler on the sample receive path
//!
//! Raw packets are split into frames, frames are appended to the typed
//! columns of the pending chunk, and every time the chunk reaches
//! `chunk_size` samples it is handed to the consumer and cleared. A chunk
//! left incomplete when the session ends is never dispatched.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

use crate::acquisition::channel::ChannelLayout;
use crate::acquisition::chunk::Chunk;
use crate::acquisition::frame::{frame_count, FrameError};

/// Counters of one assembler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssemblerStats {
    pub samples_assembled: u64,
    pub chunks_dispatched: u64,
    pub packets_malformed: u64,
}

/// Groups incoming sample frames into chunks for one streaming session
pub struct ChunkAssembler {
    layout: Arc<ChannelLayout>,
    chunk_size: usize,
    chunk: Chunk,
    sample_index: Arc<AtomicU64>,
    stats: AssemblerStats,
}

impl ChunkAssembler {
    /// `sample_index` is advanced once per assembled sample and read by the annotation log
    pub fn new(layout: ChannelLayout, chunk_size: usize, sample_index: Arc<AtomicU64>) -> Self {
        let chunk_size = chunk_size.max(1);
        let layout = Arc::new(layout);
        Self {
            chunk: Chunk::new(layout.clone(), chunk_size),
            layout,
            chunk_size,
            sample_index,
            stats: AssemblerStats::default(),
        }
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn stats(&self) -> AssemblerStats {
        self.stats
    }

    /// Samples waiting in the incomplete chunk
    pub fn pending(&self) -> usize {
        self.chunk.len()
    }

    /// Consume one packet, calling `dispatch` once per completed chunk.
    ///
    /// Returns the number of chunks dispatched. A misaligned packet is dropped
    /// whole and leaves the pending chunk untouched.
    pub fn push_packet<F>(&mut self, packet: &[u8], mut dispatch: F) -> Result<usize, FrameError>
    where
        F: FnMut(&Chunk),
    {
        let frames = match frame_count(&self.layout, packet.len()) {
            Ok(frames) => frames,
            Err(err) => {
                self.stats.packets_malformed += 1;
                warn!(error = %err, malformed = self.stats.packets_malformed, "dropping sample packet");
                return Err(err);
            }
        };

        let frame_len = self.layout.frame_len();
        let mut dispatched = 0;
        for frame in packet.chunks_exact(frame_len) {
            self.chunk.push_frame(frame);
            self.sample_index.fetch_add(1, Ordering::Release);
            self.stats.samples_assembled += 1;

            if self.chunk.len() == self.chunk_size {
                dispatch(&self.chunk);
                self.chunk.clear();
                self.stats.chunks_dispatched += 1;
                dispatched += 1;
            }
        }

        trace!(frames, dispatched, pending = self.chunk.len(), "sample packet assembled");
        Ok(dispatched)
    }
}
