//! # Transfer Context
//!
//! Entry point for buffer copies and clears. Owns both rings and the engine
//! state, chooses the engine, and runs plan → prepare → emit → finish.
//!
//! ```text
//!            ┌──────────── Context ────────────┐
//! copy/clear │  plan ─► prepare ─► emit ─► finish
//!            │            │
//!            │   GFX ring ◄──► DMA ring  (cross flush)
//!            └─────────────────────────────────┘
//! ```

use alloc::vec::Vec;

use kiln_core::{AddressResolver, Error, Flushable, FlushMode, Result, RingType};
use kiln_mem::{BufferObject, CacheFlags};

use crate::chunk::AddressMode;
use crate::emit::{emit_clear, emit_copy, ClearPlan, CopyEngine, CopyPlan};
use crate::packet::DmaLayout;
use crate::ring::{Ring, RingConfig, Submission};
use crate::sync::{self, EngineState};

// =============================================================================
// HARDWARE CAPABILITIES
// =============================================================================

/// GPU family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipFamily {
    /// r6xx
    R600,
    /// r7xx
    R700,
    /// Evergreen
    Evergreen,
    /// Northern Islands (Cayman)
    Cayman,
}

impl ChipFamily {
    /// DMA ring packet layout
    pub const fn dma_layout(self) -> DmaLayout {
        match self {
            Self::R600 | Self::R700 => DmaLayout::R600,
            Self::Evergreen | Self::Cayman => DmaLayout::Evergreen,
        }
    }
}

/// Engines available to the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChipCaps {
    /// GPU family
    pub family: ChipFamily,
    /// A DMA ring exists
    pub has_dma: bool,
    /// The CP supports the CP_DMA packet
    pub has_cp_dma: bool,
}

impl ChipCaps {
    /// Default capabilities of `family`
    pub const fn for_family(family: ChipFamily) -> Self {
        Self {
            family,
            has_dma: true,
            has_cp_dma: matches!(family, ChipFamily::Evergreen | ChipFamily::Cayman),
        }
    }
}

/// Context configuration
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Hardware capabilities
    pub caps: ChipCaps,
    /// GFX ring configuration
    pub gfx_ring: RingConfig,
    /// DMA ring configuration
    pub dma_ring: RingConfig,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            caps: ChipCaps::for_family(ChipFamily::Evergreen),
            gfx_ring: RingConfig::default(),
            dma_ring: RingConfig::default(),
        }
    }
}

/// Which engine a copy should use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineHint {
    /// DMA ring when it can encode the request, CP DMA otherwise
    #[default]
    Auto,
    /// CP DMA on the GFX ring
    Gfx,
    /// The DMA ring
    Dma,
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Buffer transfer context
#[derive(Debug)]
pub struct Context {
    caps: ChipCaps,
    gfx: Ring,
    dma: Option<Ring>,
    state: EngineState,
}

impl Context {
    /// Create a context
    pub fn new(config: ContextConfig) -> Self {
        let dma = config
            .caps
            .has_dma
            .then(|| Ring::dma(config.caps.family.dma_layout(), &config.dma_ring));

        log::debug!(
            "context: {:?}, dma ring {}, cp dma {}",
            config.caps.family,
            config.caps.has_dma,
            config.caps.has_cp_dma
        );

        Self {
            caps: config.caps,
            gfx: Ring::gfx(&config.gfx_ring),
            dma,
            state: EngineState::default(),
        }
    }

    /// Get hardware capabilities
    pub fn caps(&self) -> &ChipCaps {
        &self.caps
    }

    /// Flush obligations carried to the next GFX transfer
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Require `caches` to be flushed before the next GFX transfer
    pub fn mark_caches_dirty(&mut self, caches: CacheFlags) {
        self.state.mark_dirty(caches);
    }

    /// Require a 3D idle wait before the next GFX transfer
    pub fn request_3d_idle(&mut self) {
        self.state.request_3d_idle();
    }

    /// Get GFX ring
    pub fn gfx(&self) -> &Ring {
        &self.gfx
    }

    /// Get DMA ring, if present
    pub fn dma(&self) -> Option<&Ring> {
        self.dma.as_ref()
    }

    /// Submit the current buffer of `ring`
    pub fn flush(&mut self, ring: RingType, mode: FlushMode) -> Result<Option<u64>> {
        Ok(self.ring_mut(ring)?.flush(mode))
    }

    /// Drain the flushed submissions of `ring`
    pub fn take_submissions(&mut self, ring: RingType) -> Vec<Submission> {
        self.ring_mut(ring)
            .map(Ring::take_submissions)
            .unwrap_or_default()
    }

    // =========================================================================
    // Copy
    // =========================================================================

    /// Copy `size` bytes from `src` at `src_offset` to `dst` at
    /// `dst_offset`, submitting the ring and retrying once if its buffer is
    /// full.
    ///
    /// # Panics
    ///
    /// Panics on a zero size.
    pub fn copy_buffer(
        &mut self,
        hint: EngineHint,
        dst: &BufferObject,
        dst_offset: u64,
        src: &BufferObject,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        let plan = self.plan_copy(hint, dst, dst_offset, src, src_offset, size)?;
        self.with_retry(plan.engine().ring_type(), |ctx| ctx.encode_copy(&plan, dst, src))
    }

    /// Single attempt at [`Context::copy_buffer`].
    ///
    /// Returns [`Error::CommandBufferFull`] instead of submitting.
    pub fn try_copy(
        &mut self,
        hint: EngineHint,
        dst: &BufferObject,
        dst_offset: u64,
        src: &BufferObject,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        let plan = self.plan_copy(hint, dst, dst_offset, src, src_offset, size)?;
        self.encode_copy(&plan, dst, src)
    }

    fn plan_copy(
        &self,
        hint: EngineHint,
        dst: &BufferObject,
        dst_offset: u64,
        src: &BufferObject,
        src_offset: u64,
        size: u64,
    ) -> Result<CopyPlan> {
        assert!(size > 0, "zero-sized transfer");

        let engine = match hint {
            EngineHint::Dma => {
                let ring = self.dma.as_ref().ok_or(Error::RingUnavailable)?;
                CopyEngine::Dma(ring.layout())
            }
            EngineHint::Gfx if self.caps.has_cp_dma => CopyEngine::CpDma,
            EngineHint::Gfx => return Err(Error::NotSupported),
            EngineHint::Auto => {
                let aligned = AddressMode::select(
                    dst.resolve_address(dst_offset),
                    src.resolve_address(src_offset),
                    size,
                ) == AddressMode::Dword;

                match self.dma.as_ref().map(Ring::layout) {
                    Some(DmaLayout::Evergreen) => CopyEngine::Dma(DmaLayout::Evergreen),
                    Some(DmaLayout::R600) if aligned => CopyEngine::Dma(DmaLayout::R600),
                    _ if self.caps.has_cp_dma => CopyEngine::CpDma,
                    _ => return Err(Error::NotSupported),
                }
            }
        };

        CopyPlan::new(engine, dst, dst_offset, src, src_offset, size)
    }

    fn encode_copy(&mut self, plan: &CopyPlan, dst: &BufferObject, src: &BufferObject) -> Result<()> {
        let ring_type = plan.engine().ring_type();
        let state = self.gfx_entry_state(ring_type);
        let (ring, other) = self.rings(ring_type)?;

        let (state, mut w) = sync::prepare(state, ring, other, dst, plan.budget())?;
        let bytes = emit_copy(&mut w, plan, dst, src);
        drop(w);

        self.state = sync::finish(state, dst, plan.dst_range());

        log::debug!(
            "copy {:?} -> {:?}: {} bytes in {} chunks on {} ring",
            src.handle(),
            dst.handle(),
            bytes,
            plan.chunks().chunk_count(),
            ring_type
        );
        Ok(())
    }

    // =========================================================================
    // Clear
    // =========================================================================

    /// Fill `size` bytes of `dst` at `offset` with the 32-bit `value`,
    /// submitting the GFX ring and retrying once if its buffer is full.
    ///
    /// # Panics
    ///
    /// Panics on a zero size or when the hardware has no CP DMA.
    pub fn clear_buffer(&mut self, dst: &BufferObject, offset: u64, size: u64, value: u32) -> Result<()> {
        let plan = self.plan_clear(dst, offset, size, value);
        self.with_retry(RingType::Gfx, |ctx| ctx.encode_clear(&plan, dst))
    }

    /// Single attempt at [`Context::clear_buffer`].
    ///
    /// Returns [`Error::CommandBufferFull`] instead of submitting.
    pub fn try_clear(&mut self, dst: &BufferObject, offset: u64, size: u64, value: u32) -> Result<()> {
        let plan = self.plan_clear(dst, offset, size, value);
        self.encode_clear(&plan, dst)
    }

    fn plan_clear(&self, dst: &BufferObject, offset: u64, size: u64, value: u32) -> ClearPlan {
        assert!(size > 0, "zero-sized transfer");
        assert!(self.caps.has_cp_dma, "buffer clear needs CP DMA");
        ClearPlan::new(dst, offset, size, value)
    }

    fn encode_clear(&mut self, plan: &ClearPlan, dst: &BufferObject) -> Result<()> {
        let state = self.gfx_entry_state(RingType::Gfx);
        let (ring, other) = self.rings(RingType::Gfx)?;

        let (state, mut w) = sync::prepare(state, ring, other, dst, plan.budget())?;
        let bytes = emit_clear(&mut w, plan, dst);
        drop(w);

        self.state = sync::finish(state, dst, plan.dst_range());

        log::debug!(
            "clear {:?} to {:#010x}: {} bytes in {} chunks",
            dst.handle(),
            plan.value(),
            bytes,
            plan.chunks().chunk_count()
        );
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// CP DMA must not start while the 3D pipe still reads or writes memory
    fn gfx_entry_state(&self, ring: RingType) -> EngineState {
        let mut state = self.state;
        if ring == RingType::Gfx {
            state.request_3d_idle();
        }
        state
    }

    fn with_retry(&mut self, ring: RingType, mut op: impl FnMut(&mut Self) -> Result<()>) -> Result<()> {
        match op(self) {
            Err(Error::CommandBufferFull) => {
                log::warn!("{} ring command buffer full, submitting and retrying", ring);
                self.flush(ring, FlushMode::Async)?;
                op(self)
            }
            result => result,
        }
    }

    fn ring_mut(&mut self, ring: RingType) -> Result<&mut Ring> {
        match ring {
            RingType::Gfx => Ok(&mut self.gfx),
            RingType::Dma => self.dma.as_mut().ok_or(Error::RingUnavailable),
        }
    }

    /// `ring` plus the other ring, as a flush target
    fn rings(&mut self, ring: RingType) -> Result<(&mut Ring, Option<&mut dyn Flushable>)> {
        match ring {
            RingType::Gfx => {
                let other = self.dma.as_mut().map(|dma| dma as &mut dyn Flushable);
                Ok((&mut self.gfx, other))
            }
            RingType::Dma => {
                let dma = self.dma.as_mut().ok_or(Error::RingUnavailable)?;
                Ok((dma, Some(&mut self.gfx as &mut dyn Flushable)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flush::{MAX_FLUSH_DWORDS, WAIT_3D_IDLE};
    use crate::packet::{pkt3_opcode, CP_DMA_CP_SYNC, PKT3_CP_DMA, PKT3_SET_CONFIG_REG, PKT3_SURFACE_SYNC};
    use crate::validate::check_stream;
    use alloc::sync::Arc;
    use kiln_mem::{BindFlags, BufferTable};

    fn config(family: ChipFamily, gfx_dw: usize) -> ContextConfig {
        ContextConfig {
            caps: ChipCaps::for_family(family),
            gfx_ring: RingConfig { capacity_dw: gfx_dw },
            dma_ring: RingConfig::default(),
        }
    }

    fn buffers(sizes: &[u64]) -> Vec<Arc<BufferObject>> {
        let mut table = BufferTable::new();
        sizes.iter().map(|&size| table.create(size).unwrap()).collect()
    }

    #[test]
    fn test_clear_of_dirty_target_flushes_once() {
        let bufs = buffers(&[0x40_0000]);
        let dst = &bufs[0];
        dst.bind(BindFlags::RENDER_TARGET);
        dst.mark_cache_dirty(CacheFlags::COLOR);

        let mut ctx = Context::new(ContextConfig::default());
        ctx.clear_buffer(dst, 0, 0x40_0000, 0).unwrap();

        let words = ctx.gfx().stream().words();
        // EVENT_WRITE(2) + SURFACE_SYNC(5) + WAIT_UNTIL(3), then 3 chunks of 8
        assert_eq!(words.len(), 10 + 3 * 8);
        assert_eq!(pkt3_opcode(words[2]), PKT3_SURFACE_SYNC);
        assert_eq!(pkt3_opcode(words[7]), PKT3_SET_CONFIG_REG);
        assert_eq!(words[9], WAIT_3D_IDLE);

        let packets: Vec<&[u32]> = words[10..].chunks(8).collect();
        assert!(packets.iter().all(|p| pkt3_opcode(p[0]) == PKT3_CP_DMA));
        assert_eq!(
            packets.iter().filter(|p| p[2] & CP_DMA_CP_SYNC != 0).count(),
            1
        );
        assert_ne!(packets[2][2] & CP_DMA_CP_SYNC, 0);
        assert_eq!(
            words.iter().filter(|&&w| pkt3_opcode(w) == PKT3_SURFACE_SYNC && w >> 30 == 3).count(),
            1
        );

        assert!(dst.is_range_valid(0..0x40_0000));
        assert_eq!(dst.dirty_caches(), CacheFlags::COLOR);
        assert!(!ctx.state().needs_flush());
        assert_eq!(check_stream(ctx.gfx().stream(), DmaLayout::Evergreen), Ok(()));
    }

    #[test]
    fn test_auto_copy_prefers_dma_ring() {
        let bufs = buffers(&[0x20_0000, 0x20_0000]);
        let (src, dst) = (&bufs[0], &bufs[1]);

        let mut ctx = Context::new(ContextConfig::default());
        ctx.copy_buffer(EngineHint::Auto, dst, 0, src, 0, 0x10_0003).unwrap();

        let dma = ctx.dma().unwrap();
        assert_eq!(dma.stream().cdw(), 10);
        assert_eq!(dma.stream().relocations().records().len(), 4);
        assert!(ctx.gfx().stream().is_empty());
        assert_eq!(dst.valid_ranges(), [0..0x10_0003]);
    }

    #[test]
    fn test_switching_rings_flushes_the_other() {
        let bufs = buffers(&[0x1000, 0x1000]);
        let (src, dst) = (&bufs[0], &bufs[1]);
        let mut ctx = Context::new(ContextConfig::default());

        ctx.clear_buffer(src, 0, 0x1000, 0xffff_ffff).unwrap();
        ctx.copy_buffer(EngineHint::Dma, dst, 0, src, 0, 0x1000).unwrap();

        assert!(ctx.gfx().stream().is_empty());
        assert_eq!(ctx.gfx().stats().async_flushes, 1);

        ctx.copy_buffer(EngineHint::Gfx, src, 0, dst, 0, 0x1000).unwrap();
        assert!(ctx.dma().unwrap().stream().is_empty());

        let subs = ctx.take_submissions(RingType::Dma);
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].relocs.len(), 2);
    }

    #[test]
    fn test_full_buffer_retries_once() {
        let bufs = buffers(&[0x1000]);
        let dst = &bufs[0];
        let mut ctx = Context::new(config(ChipFamily::Evergreen, 40));

        // WAIT_UNTIL(3) + one chunk(8) each; every attempt reserves 8 + 16
        ctx.clear_buffer(dst, 0, 0x100, 0).unwrap();
        ctx.clear_buffer(dst, 0x100, 0x100, 0).unwrap();
        assert_eq!(ctx.gfx().stream().cdw(), 22);

        assert_eq!(ctx.try_clear(dst, 0x200, 0x100, 0), Err(Error::CommandBufferFull));
        assert_eq!(ctx.gfx().stream().cdw(), 22);
        assert!(!dst.is_range_initialized(0x200..0x300));

        ctx.clear_buffer(dst, 0x200, 0x100, 0).unwrap();
        assert_eq!(ctx.gfx().stream().cdw(), 11);
        assert_eq!(ctx.gfx().stats().total_submissions, 1);
        assert_eq!(dst.valid_ranges(), [0..0x300]);
    }

    #[test]
    fn test_oversized_operation_is_not_retried() {
        let bufs = buffers(&[0x1000]);
        let mut ctx = Context::new(config(ChipFamily::Evergreen, 8 + MAX_FLUSH_DWORDS - 1));

        assert_eq!(ctx.clear_buffer(&bufs[0], 0, 0x100, 0), Err(Error::ExceedsRingCapacity));
        assert_eq!(ctx.gfx().stats().total_submissions, 0);
        assert!(!bufs[0].is_range_initialized(0..0x100));
    }

    #[test]
    fn test_r600_engine_selection() {
        let bufs = buffers(&[0x1000, 0x1000]);
        let (src, dst) = (&bufs[0], &bufs[1]);
        let mut ctx = Context::new(ContextConfig {
            caps: ChipCaps::for_family(ChipFamily::R700),
            ..ContextConfig::default()
        });

        assert_eq!(
            ctx.copy_buffer(EngineHint::Auto, dst, 1, src, 0, 8),
            Err(Error::NotSupported)
        );
        assert_eq!(
            ctx.copy_buffer(EngineHint::Gfx, dst, 0, src, 0, 8),
            Err(Error::NotSupported)
        );

        ctx.copy_buffer(EngineHint::Auto, dst, 0, src, 0, 0x1000).unwrap();
        let dma = ctx.dma().unwrap();
        assert_eq!(dma.layout(), DmaLayout::R600);
        assert_eq!(dma.stream().words()[0], 0x3000_0400);
    }

    #[test]
    fn test_missing_dma_ring() {
        let bufs = buffers(&[0x1000, 0x1000]);
        let (src, dst) = (&bufs[0], &bufs[1]);
        let mut ctx = Context::new(ContextConfig {
            caps: ChipCaps {
                has_dma: false,
                ..ChipCaps::for_family(ChipFamily::Cayman)
            },
            ..ContextConfig::default()
        });

        assert_eq!(
            ctx.copy_buffer(EngineHint::Dma, dst, 0, src, 0, 16),
            Err(Error::RingUnavailable)
        );
        assert_eq!(ctx.flush(RingType::Dma, FlushMode::Sync), Err(Error::RingUnavailable));
        assert!(ctx.take_submissions(RingType::Dma).is_empty());

        ctx.copy_buffer(EngineHint::Auto, dst, 0, src, 0, 16).unwrap();
        assert_eq!(ctx.gfx().stream().cdw(), 3 + 10);
    }

    #[test]
    #[should_panic(expected = "zero-sized transfer")]
    fn test_zero_sized_copy_panics() {
        let bufs = buffers(&[0x1000, 0x1000]);
        let mut ctx = Context::new(ContextConfig::default());
        let _ = ctx.copy_buffer(EngineHint::Auto, &bufs[1], 0, &bufs[0], 0, 0);
    }
}
