//! # Command Ring
//!
//! One hardware ring as seen by the encoder: the command buffer being filled
//! and the queue of buffers handed off for submission.
//!
//! ```text
//!  reserve/emit          flush(mode)              take_submissions()
//! ──────────────► [CommandStream] ──────► [Submission queue] ──────► kernel layer
//!                                    fence N
//! ```

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use kiln_core::{Flushable, FlushMode, Result, RingType};

use crate::packet::DmaLayout;
use crate::reloc::RelocBuffer;
use crate::stream::{CommandStream, CsWriter};

// =============================================================================
// RING CONFIGURATION
// =============================================================================

/// Default command buffer size in dwords
pub const DEFAULT_RING_CAPACITY_DW: usize = 16 * 1024;

/// Command ring configuration
#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Command buffer size in dwords
    pub capacity_dw: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity_dw: DEFAULT_RING_CAPACITY_DW,
        }
    }
}

// =============================================================================
// SUBMISSION
// =============================================================================

/// A command buffer handed off for execution
#[derive(Debug, Clone)]
pub struct Submission {
    /// Fence value signalled when the buffer retires
    pub fence: u64,
    /// Target ring
    pub ring: RingType,
    /// Requested flush mode
    pub mode: FlushMode,
    /// Command dwords
    pub words: Vec<u32>,
    /// Buffer list for the kernel
    pub relocs: Vec<RelocBuffer>,
}

/// Ring statistics
#[derive(Debug, Clone, Default)]
pub struct RingStats {
    /// Total submissions
    pub total_submissions: u64,
    /// Submissions requested asynchronously
    pub async_flushes: u64,
    /// Reservations refused for lack of space
    pub buffer_full: u64,
    /// Dwords handed off
    pub words_submitted: u64,
}

// =============================================================================
// RING
// =============================================================================

/// GFX or DMA command ring
#[derive(Debug)]
pub struct Ring {
    /// Packet layout of the DMA engine (unused on GFX)
    layout: DmaLayout,
    /// Buffer being filled
    cs: CommandStream,
    /// Next fence value
    next_fence: u64,
    /// Flushed, not yet taken
    pending: VecDeque<Submission>,
    /// Statistics
    stats: RingStats,
}

impl Ring {
    /// Create the GFX ring
    pub fn gfx(config: &RingConfig) -> Self {
        Self::new(RingType::Gfx, DmaLayout::Evergreen, config)
    }

    /// Create a DMA ring using `layout` packets
    pub fn dma(layout: DmaLayout, config: &RingConfig) -> Self {
        Self::new(RingType::Dma, layout, config)
    }

    fn new(ring: RingType, layout: DmaLayout, config: &RingConfig) -> Self {
        Self {
            layout,
            cs: CommandStream::new(ring, config.capacity_dw),
            next_fence: 1,
            pending: VecDeque::new(),
            stats: RingStats::default(),
        }
    }

    /// DMA packet layout
    pub fn layout(&self) -> DmaLayout {
        self.layout
    }

    /// Buffer being filled
    pub fn stream(&self) -> &CommandStream {
        &self.cs
    }

    /// Reserve `words` dwords in the current buffer
    pub fn reserve(&mut self, words: usize) -> Result<CsWriter<'_>> {
        if let Err(err) = self.cs.check_space(words) {
            self.stats.buffer_full += 1;
            log::debug!(
                "{} ring: cannot reserve {} dwords ({} of {} used): {}",
                self.cs.ring_type(),
                words,
                self.cs.cdw(),
                self.cs.capacity(),
                err
            );
            return Err(err);
        }

        self.cs.reserve(words)
    }

    /// Get next fence value
    pub fn next_fence_value(&self) -> u64 {
        self.next_fence
    }

    /// Number of flushed submissions not yet taken
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drain flushed submissions in fence order
    pub fn take_submissions(&mut self) -> Vec<Submission> {
        self.pending.drain(..).collect()
    }

    /// Get ring statistics
    pub fn stats(&self) -> &RingStats {
        &self.stats
    }

    /// Queue the current buffer for execution
    pub fn submit(&mut self, mode: FlushMode) -> Option<u64> {
        if self.cs.is_empty() {
            return None;
        }

        self.validate();

        let ring = self.cs.ring_type();
        let (words, relocs) = self.cs.take();

        let fence = self.next_fence;
        self.next_fence += 1;

        self.stats.total_submissions += 1;
        self.stats.words_submitted += words.len() as u64;
        if mode == FlushMode::Async {
            self.stats.async_flushes += 1;
        }

        log::debug!(
            "{} ring: submit fence {} ({} dwords, {} buffers, {})",
            ring,
            fence,
            words.len(),
            relocs.buffers().len(),
            mode
        );

        self.pending.push_back(Submission {
            fence,
            ring,
            mode,
            words,
            relocs: relocs.buffers().to_vec(),
        });

        Some(fence)
    }
}

impl Ring {
    #[cfg(feature = "validation")]
    fn validate(&self) {
        if let Err(err) = crate::validate::check_stream(&self.cs, self.layout) {
            log::error!("{} ring: command stream failed validation: {}", self.cs.ring_type(), err);
        }
    }

    #[cfg(not(feature = "validation"))]
    fn validate(&self) {}
}

impl Flushable for Ring {
    fn ring_type(&self) -> RingType {
        self.cs.ring_type()
    }

    fn has_pending_work(&self) -> bool {
        !self.cs.is_empty()
    }

    fn flush(&mut self, mode: FlushMode) -> Option<u64> {
        self.submit(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Error;

    fn small() -> RingConfig {
        RingConfig { capacity_dw: 8 }
    }

    #[test]
    fn test_flush_empty_ring_is_noop() {
        let mut ring = Ring::gfx(&small());
        assert!(!ring.has_pending_work());
        assert_eq!(ring.flush(FlushMode::Async), None);
        assert_eq!(ring.stats().total_submissions, 0);
    }

    #[test]
    fn test_flush_rotates_buffer() {
        let mut ring = Ring::dma(DmaLayout::Evergreen, &small());
        ring.reserve(3).unwrap().emit_slice(&[1, 2, 3]);
        assert!(ring.has_pending_work());

        assert_eq!(ring.flush(FlushMode::Async), Some(1));
        assert!(!ring.has_pending_work());
        assert_eq!(ring.next_fence_value(), 2);

        ring.reserve(1).unwrap().emit(4);
        assert_eq!(ring.flush(FlushMode::Sync), Some(2));

        let subs = ring.take_submissions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].words, [1, 2, 3]);
        assert_eq!(subs[0].ring, RingType::Dma);
        assert_eq!(subs[1].mode, FlushMode::Sync);
        assert_eq!(ring.pending_count(), 0);

        let stats = ring.stats();
        assert_eq!(stats.total_submissions, 2);
        assert_eq!(stats.async_flushes, 1);
        assert_eq!(stats.words_submitted, 4);
    }

    #[test]
    fn test_buffer_full_is_counted() {
        let mut ring = Ring::gfx(&small());
        ring.reserve(6).unwrap().emit_slice(&[0; 6]);

        assert_eq!(ring.reserve(4).unwrap_err(), Error::CommandBufferFull);
        assert_eq!(ring.reserve(9).unwrap_err(), Error::ExceedsRingCapacity);
        assert_eq!(ring.stats().buffer_full, 2);
        assert_eq!(ring.stream().cdw(), 6);
    }
}
