//! # Packet Emitter
//!
//! Writes the chunk packets of a planned transfer into a reserved
//! [`CsWriter`].
//!
//! A plan is built first so the synchronizer can reserve the exact budget:
//!
//! ```text
//! CopyPlan / ClearPlan ── budget() ──► sync::prepare ──► CsWriter
//!                                                          │
//!         emit_copy / emit_clear ◄─────────────────────────┘
//!           per chunk: relocations, packet, NOP + token(s)
//! ```
//!
//! Relocations are always added before the packet words that embed the
//! buffer's address, so the stream is consistent at every dword boundary.

use core::ops::Range;

use kiln_core::{AddressResolver, Error, GpuAddr, Result, RingType};
use kiln_mem::BufferObject;

use crate::chunk::{AddressMode, ChunkPlan, DMA_MAX_COPY_UNITS, R600_DMA_MAX_COPY_DWORDS};
use crate::packet::{
    nop_reloc, CpDmaPacket, CpDmaSource, DmaCopyPacket, DmaLayout, CP_DMA_MAX_BYTE_COUNT,
};
use crate::reloc::Usage;
use crate::stream::CsWriter;
use crate::sync::Budget;

/// Dwords per DMA ring copy chunk
pub const DMA_COPY_CHUNK_DWORDS: usize = DmaCopyPacket::DWORDS;
/// Dwords per CP DMA clear chunk: packet, NOP, token
pub const CP_DMA_CLEAR_CHUNK_DWORDS: usize = CpDmaPacket::DWORDS + 2;
/// Dwords per CP DMA copy chunk: packet, two NOP/token pairs
pub const CP_DMA_COPY_CHUNK_DWORDS: usize = CpDmaPacket::DWORDS + 4;

// =============================================================================
// COPY
// =============================================================================

/// Engine carrying a buffer copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyEngine {
    /// DMA ring copy packets
    Dma(DmaLayout),
    /// CP DMA on the GFX ring
    CpDma,
}

impl CopyEngine {
    /// Ring this engine writes
    pub const fn ring_type(self) -> RingType {
        match self {
            Self::Dma(_) => RingType::Dma,
            Self::CpDma => RingType::Gfx,
        }
    }

    /// Dwords each chunk emits
    pub const fn words_per_chunk(self) -> usize {
        match self {
            Self::Dma(_) => DMA_COPY_CHUNK_DWORDS,
            Self::CpDma => CP_DMA_COPY_CHUNK_DWORDS,
        }
    }
}

/// A buffer copy, resolved and split into chunks
#[derive(Debug, Clone)]
pub struct CopyPlan {
    engine: CopyEngine,
    mode: AddressMode,
    dst_offset: u64,
    size: u64,
    dst_va: GpuAddr,
    src_va: GpuAddr,
    chunks: ChunkPlan,
}

impl CopyPlan {
    /// Plan copying `size` bytes from `src` at `src_offset` to `dst` at
    /// `dst_offset`.
    ///
    /// Fails with [`Error::NotSupported`] when `engine` cannot address the
    /// request (r6xx DMA needs dword alignment).
    ///
    /// # Panics
    ///
    /// Panics on a zero size.
    pub fn new(
        engine: CopyEngine,
        dst: &BufferObject,
        dst_offset: u64,
        src: &BufferObject,
        src_offset: u64,
        size: u64,
    ) -> Result<Self> {
        assert!(size > 0, "zero-sized transfer");
        debug_assert!(dst_offset + size <= dst.size(), "copy past end of destination");
        debug_assert!(src_offset + size <= src.size(), "copy past end of source");
        debug_assert!(
            dst.handle() != src.handle()
                || dst_offset + size <= src_offset
                || src_offset + size <= dst_offset,
            "overlapping copy within one buffer"
        );

        let dst_va = dst.resolve_address(dst_offset);
        let src_va = src.resolve_address(src_offset);

        let (mode, max_units) = match engine {
            CopyEngine::Dma(DmaLayout::Evergreen) => {
                (AddressMode::select(dst_va, src_va, size), DMA_MAX_COPY_UNITS)
            }
            CopyEngine::Dma(DmaLayout::R600) => {
                match AddressMode::select(dst_va, src_va, size) {
                    AddressMode::Dword => (AddressMode::Dword, R600_DMA_MAX_COPY_DWORDS),
                    AddressMode::Byte => return Err(Error::NotSupported),
                }
            }
            CopyEngine::CpDma => (AddressMode::Byte, CP_DMA_MAX_BYTE_COUNT),
        };

        Ok(Self {
            engine,
            mode,
            dst_offset,
            size,
            dst_va,
            src_va,
            chunks: ChunkPlan::new(size, mode.shift(), max_units),
        })
    }

    /// Get engine
    pub fn engine(&self) -> CopyEngine {
        self.engine
    }

    /// Addressing mode of the DMA packets
    pub fn mode(&self) -> AddressMode {
        self.mode
    }

    /// Chunk split
    pub fn chunks(&self) -> &ChunkPlan {
        &self.chunks
    }

    /// Dword budget for the synchronizer
    pub fn budget(&self) -> Budget {
        Budget {
            words_per_chunk: self.engine.words_per_chunk(),
            chunks: self.chunks.chunk_count(),
        }
    }

    /// Destination byte range written
    pub fn dst_range(&self) -> Range<u64> {
        self.dst_offset..self.dst_offset + self.size
    }
}

/// Emit the chunks of a copy. Returns the bytes covered.
pub fn emit_copy(
    w: &mut CsWriter<'_>,
    plan: &CopyPlan,
    dst: &BufferObject,
    src: &BufferObject,
) -> u64 {
    debug_assert_eq!(w.ring_type(), plan.engine.ring_type());

    let mut emitted = 0;
    for chunk in plan.chunks.chunks() {
        let dst_va = plan.dst_va.offset(chunk.offset);
        let src_va = plan.src_va.offset(chunk.offset);

        match plan.engine {
            CopyEngine::Dma(layout) => {
                w.add_reloc(src, Usage::READ);
                w.add_reloc(dst, Usage::WRITE);
                w.emit_slice(
                    &DmaCopyPacket {
                        layout,
                        mode: plan.mode,
                        count: chunk.units,
                        dst: dst_va,
                        src: src_va,
                    }
                    .encode(),
                );
            }
            CopyEngine::CpDma => {
                let src_token = w.add_reloc(src, Usage::READ);
                let dst_token = w.add_reloc(dst, Usage::WRITE);
                w.emit_slice(
                    &CpDmaPacket {
                        source: CpDmaSource::Address(src_va),
                        dst: dst_va,
                        byte_count: chunk.bytes as u32,
                        sync: chunk.last,
                    }
                    .encode(),
                );
                w.emit_slice(&nop_reloc(src_token));
                w.emit_slice(&nop_reloc(dst_token));
            }
        }

        log::trace!(
            "copy chunk {}: {} -> {}, {} bytes{}",
            chunk.index,
            src_va,
            dst_va,
            chunk.bytes,
            if chunk.last { " (last)" } else { "" }
        );
        emitted += chunk.bytes;
    }

    debug_assert_eq!(emitted, plan.size);
    emitted
}

// =============================================================================
// CLEAR
// =============================================================================

/// A CP DMA fill, resolved and split into chunks
#[derive(Debug, Clone)]
pub struct ClearPlan {
    offset: u64,
    size: u64,
    value: u32,
    dst_va: GpuAddr,
    chunks: ChunkPlan,
}

impl ClearPlan {
    /// Plan filling `size` bytes of `dst` at `offset` with `value`
    ///
    /// # Panics
    ///
    /// Panics on a zero size.
    pub fn new(dst: &BufferObject, offset: u64, size: u64, value: u32) -> Self {
        assert!(size > 0, "zero-sized transfer");
        debug_assert!(offset + size <= dst.size(), "clear past end of buffer");

        Self {
            offset,
            size,
            value,
            dst_va: dst.resolve_address(offset),
            chunks: ChunkPlan::new(size, 0, CP_DMA_MAX_BYTE_COUNT),
        }
    }

    /// Fill value
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Chunk split
    pub fn chunks(&self) -> &ChunkPlan {
        &self.chunks
    }

    /// Dword budget for the synchronizer
    pub fn budget(&self) -> Budget {
        Budget {
            words_per_chunk: CP_DMA_CLEAR_CHUNK_DWORDS,
            chunks: self.chunks.chunk_count(),
        }
    }

    /// Destination byte range written
    pub fn dst_range(&self) -> Range<u64> {
        self.offset..self.offset + self.size
    }
}

/// Emit the chunks of a clear. Returns the bytes covered.
pub fn emit_clear(w: &mut CsWriter<'_>, plan: &ClearPlan, dst: &BufferObject) -> u64 {
    debug_assert_eq!(w.ring_type(), RingType::Gfx);

    let mut emitted = 0;
    for chunk in plan.chunks.chunks() {
        let dst_va = plan.dst_va.offset(chunk.offset);

        let token = w.add_reloc(dst, Usage::WRITE);
        w.emit_slice(
            &CpDmaPacket {
                source: CpDmaSource::Data(plan.value),
                dst: dst_va,
                byte_count: chunk.bytes as u32,
                sync: chunk.last,
            }
            .encode(),
        );
        w.emit_slice(&nop_reloc(token));

        log::trace!("clear chunk {}: {}, {} bytes", chunk.index, dst_va, chunk.bytes);
        emitted += chunk.bytes;
    }

    debug_assert_eq!(emitted, plan.size);
    emitted
}
