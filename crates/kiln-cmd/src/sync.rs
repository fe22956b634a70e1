//! # Engine Synchronizer
//!
//! Brackets every transfer:
//!
//! ```text
//! prepare ── reserve budget (+ flush words) ──► flush other ring (async)
//!         └─ GFX only: one cache flush sequence, then clear the obligations
//! emit    ── chunks (emit.rs)
//! finish  ── re-mark destination caches dirty, grow its valid range
//! ```
//!
//! Engine state is passed in and handed back; nothing here keeps its own.

use core::ops::Range;

use kiln_core::{Error, Flushable, FlushMode, Result, RingType};
use kiln_mem::{BufferObject, CacheFlags};

use crate::flush::{flush_sequence, MAX_FLUSH_DWORDS};
use crate::ring::Ring;
use crate::stream::CsWriter;

// =============================================================================
// ENGINE STATE
// =============================================================================

/// Flush obligations carried between operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineState {
    /// Caches that must be flushed before the next GFX transfer
    pub pending: CacheFlags,
    /// Wait for the 3D pipe to go idle before the next GFX transfer
    pub wait_3d_idle: bool,
}

impl EngineState {
    /// Whether anything is owed
    pub fn needs_flush(&self) -> bool {
        !self.pending.is_empty() || self.wait_3d_idle
    }

    /// Add caches to flush
    pub fn mark_dirty(&mut self, caches: CacheFlags) {
        self.pending |= caches;
    }

    /// Require a 3D idle wait
    pub fn request_3d_idle(&mut self) {
        self.wait_3d_idle = true;
    }
}

/// Dword budget of one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    /// Dwords each chunk emits
    pub words_per_chunk: usize,
    /// Number of chunks
    pub chunks: u64,
}

impl Budget {
    /// Dwords for all chunks, or `None` if that overflows
    pub fn words(&self) -> Option<usize> {
        usize::try_from(self.chunks)
            .ok()?
            .checked_mul(self.words_per_chunk)
    }
}

// =============================================================================
// PREPARE / FINISH
// =============================================================================

/// Make `ring` ready for an operation writing `dst`.
///
/// Returns the updated state and a writer holding `budget` dwords. On error
/// nothing was written and neither ring nor `dst` changed.
pub fn prepare<'a>(
    state: EngineState,
    ring: &'a mut Ring,
    other: Option<&mut dyn Flushable>,
    dst: &BufferObject,
    budget: Budget,
) -> Result<(EngineState, CsWriter<'a>)> {
    let is_gfx = ring.ring_type() == RingType::Gfx;

    let dst_caches = dst.dirty_caches() & CacheFlags::for_bindings(dst.bindings());
    let caches = state.pending | dst_caches;
    let flush = is_gfx && (state.wait_3d_idle || !caches.is_empty());

    let mut words = budget.words().ok_or(Error::ExceedsRingCapacity)?;
    if flush {
        words = words
            .checked_add(MAX_FLUSH_DWORDS)
            .ok_or(Error::ExceedsRingCapacity)?;
    }

    let mut writer = ring.reserve(words)?;

    // Only once the reservation holds, so a refused one leaves the other ring alone
    if let Some(other) = other {
        if other.has_pending_work() {
            let fence = other.flush(FlushMode::Async);
            log::debug!(
                "flushed {} ring before {} transfer (fence {:?})",
                other.ring_type(),
                writer.ring_type(),
                fence
            );
        }
    }

    let mut state = state;
    if flush {
        writer.emit_slice(&flush_sequence(caches, true));
        dst.clear_cache_dirty(dst_caches);
        state = EngineState::default();
        log::debug!("cache flush {:?} before transfer to {:?}", caches, dst.handle());
    }

    Ok((state, writer))
}

/// Bookkeeping after `range` of `dst` was written
pub fn finish(state: EngineState, dst: &BufferObject, range: Range<u64>) -> EngineState {
    dst.mark_cache_dirty(CacheFlags::for_bindings(dst.bindings()));
    dst.add_valid_range(range);
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flush::coher;
    use crate::packet::{pkt3_opcode, DmaLayout, PKT3_EVENT_WRITE, PKT3_SURFACE_SYNC};
    use crate::ring::RingConfig;
    use kiln_core::{BufferHandle, GpuAddr};
    use kiln_mem::BindFlags;

    fn bo() -> BufferObject {
        BufferObject::new(BufferHandle::new(1), GpuAddr::new(0x1_0000_0000), 0x1000)
    }

    fn budget(chunks: u64) -> Budget {
        Budget {
            words_per_chunk: 8,
            chunks,
        }
    }

    #[test]
    fn test_clean_gfx_prepare_emits_nothing() {
        let mut ring = Ring::gfx(&RingConfig::default());
        let (state, w) = prepare(EngineState::default(), &mut ring, None, &bo(), budget(2)).unwrap();
        assert_eq!(w.written(), 0);
        assert_eq!(w.remaining(), 16);
        assert!(!state.needs_flush());
    }

    #[test]
    fn test_dirty_destination_flushed_once() {
        let dst = bo();
        dst.bind(BindFlags::SAMPLER_VIEW);
        dst.mark_cache_dirty(CacheFlags::TEXTURE | CacheFlags::DEPTH);

        let mut ring = Ring::gfx(&RingConfig::default());
        let mut state = EngineState::default();
        state.request_3d_idle();

        let (state, w) = prepare(state, &mut ring, None, &dst, budget(1)).unwrap();
        assert_eq!(w.written(), 8);
        assert_eq!(w.remaining(), MAX_FLUSH_DWORDS);
        drop(w);

        let words = ring.stream().words();
        assert_eq!(pkt3_opcode(words[0]), PKT3_SURFACE_SYNC);
        // DEPTH is not reachable through a sampler binding
        assert_eq!(words[1], coher::TC_ACTION_ENA);
        assert!(!state.needs_flush());
        assert_eq!(dst.dirty_caches(), CacheFlags::DEPTH);
    }

    #[test]
    fn test_unbound_dirty_cache_flushed_when_bound() {
        let dst = bo();
        dst.bind(BindFlags::SAMPLER_VIEW);
        dst.mark_cache_dirty(CacheFlags::TEXTURE | CacheFlags::DEPTH);

        let mut ring = Ring::gfx(&RingConfig::default());
        let (state, w) = prepare(EngineState::default(), &mut ring, None, &dst, budget(1)).unwrap();
        drop(w);
        ring.flush(FlushMode::Async);

        dst.unbind(BindFlags::SAMPLER_VIEW);
        dst.bind(BindFlags::DEPTH_STENCIL);

        let (state, w) = prepare(state, &mut ring, None, &dst, budget(1)).unwrap();
        assert_eq!(w.written(), 7);
        drop(w);

        let words = ring.stream().words();
        assert_eq!(pkt3_opcode(words[0]), PKT3_EVENT_WRITE);
        assert_eq!(pkt3_opcode(words[2]), PKT3_SURFACE_SYNC);
        assert_eq!(words[3], coher::DB_ACTION_ENA);
        assert!(!state.needs_flush());
        assert!(dst.dirty_caches().is_empty());
    }

    #[test]
    fn test_dma_ring_keeps_obligations() {
        let dst = bo();
        let mut ring = Ring::dma(DmaLayout::Evergreen, &RingConfig::default());
        let mut state = EngineState::default();
        state.mark_dirty(CacheFlags::COLOR);

        let (state, w) = prepare(state, &mut ring, None, &dst, budget(1)).unwrap();
        assert_eq!(w.written(), 0);
        assert_eq!(state.pending, CacheFlags::COLOR);
    }

    #[test]
    fn test_other_ring_flushed_after_reservation() {
        let mut gfx = Ring::gfx(&RingConfig::default());
        let mut dma = Ring::dma(DmaLayout::Evergreen, &RingConfig::default());
        dma.reserve(1).unwrap().emit(0xf000_0000);

        let (_, w) = prepare(EngineState::default(), &mut gfx, Some(&mut dma), &bo(), budget(1)).unwrap();
        drop(w);
        assert!(!dma.has_pending_work());
        assert_eq!(dma.stats().async_flushes, 1);
    }

    #[test]
    fn test_failed_reservation_has_no_side_effects() {
        let dst = bo();
        dst.bind(BindFlags::RENDER_TARGET);
        dst.mark_cache_dirty(CacheFlags::COLOR);

        let mut gfx = Ring::gfx(&RingConfig { capacity_dw: 20 });
        let mut dma = Ring::dma(DmaLayout::Evergreen, &RingConfig::default());
        dma.reserve(1).unwrap().emit(0xf000_0000);

        // 8 + 16 flush dwords can never fit 20
        let err = prepare(EngineState::default(), &mut gfx, Some(&mut dma), &dst, budget(1)).unwrap_err();
        assert_eq!(err, Error::ExceedsRingCapacity);
        assert!(gfx.stream().is_empty());
        assert!(dma.has_pending_work());
        assert_eq!(dst.dirty_caches(), CacheFlags::COLOR);
    }

    #[test]
    fn test_finish_records_write() {
        let dst = bo();
        dst.bind(BindFlags::VERTEX_BUFFER);

        let state = finish(EngineState::default(), &dst, 0x10..0x20);
        assert_eq!(state, EngineState::default());
        assert_eq!(dst.dirty_caches(), CacheFlags::VERTEX);
        assert!(dst.is_range_valid(0x10..0x20));

        finish(state, &dst, 0x10..0x20);
        assert_eq!(dst.valid_ranges().len(), 1);
    }
}
