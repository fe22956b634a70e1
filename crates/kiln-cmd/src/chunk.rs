//! # Chunking Policy
//!
//! Addressing-mode selection and the split of one transfer into packets no
//! larger than the engine's count field allows.

use core::iter::FusedIterator;

use kiln_core::GpuAddr;

use crate::packet::{DMA_COPY_SUB_BYTE, DMA_COPY_SUB_DWORD};

/// Evergreen/Cayman DMA copy: largest count per packet, in address-mode units
pub const DMA_MAX_COPY_UNITS: u32 = 0x000f_ffff;

/// r6xx/r7xx DMA copy: largest dword count per packet
pub const R600_DMA_MAX_COPY_DWORDS: u32 = 0xfffe;

// =============================================================================
// ADDRESS MODE
// =============================================================================

/// Unit the DMA engine counts in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// Count is in dwords
    Dword,
    /// Count is in bytes
    Byte,
}

impl AddressMode {
    /// Dword mode when both addresses and the size are 4-byte aligned
    pub fn select(dst: GpuAddr, src: GpuAddr, size: u64) -> Self {
        if dst.is_aligned(4) && src.is_aligned(4) && size & 0x3 == 0 {
            Self::Dword
        } else {
            Self::Byte
        }
    }

    /// log2 of the unit size in bytes
    #[inline]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Dword => 2,
            Self::Byte => 0,
        }
    }

    /// Evergreen DMA copy sub-command
    #[inline]
    pub const fn sub_cmd(self) -> u32 {
        match self {
            Self::Dword => DMA_COPY_SUB_DWORD,
            Self::Byte => DMA_COPY_SUB_BYTE,
        }
    }
}

// =============================================================================
// CHUNK PLAN
// =============================================================================

/// One packet's share of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the operation, from 0
    pub index: u64,
    /// Count field value
    pub units: u32,
    /// Byte offset of this chunk from the start of the operation
    pub offset: u64,
    /// Bytes moved by this chunk
    pub bytes: u64,
    /// Whether this chunk completes the operation
    pub last: bool,
}

/// Split of `size` bytes into packets of at most `max_units` units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    units: u64,
    max_units: u32,
    shift: u32,
}

impl ChunkPlan {
    /// Plan `size` bytes counted in `shift`-sized units.
    ///
    /// # Panics
    ///
    /// Panics on a zero size, a zero limit, or a size that is not a whole
    /// number of units.
    pub fn new(size: u64, shift: u32, max_units: u32) -> Self {
        assert!(size > 0, "zero-sized transfer");
        assert!(max_units > 0, "zero packet limit");
        assert_eq!(size & ((1 << shift) - 1), 0, "size is not a whole number of units");

        Self {
            units: size >> shift,
            max_units,
            shift,
        }
    }

    /// Number of packets
    pub fn chunk_count(&self) -> u64 {
        self.units.div_ceil(self.max_units as u64)
    }

    /// Total bytes covered
    pub fn total_bytes(&self) -> u64 {
        self.units << self.shift
    }

    /// log2 of the unit size in bytes
    pub fn shift(&self) -> u32 {
        self.shift
    }

    /// Largest count in one packet
    pub fn max_units(&self) -> u32 {
        self.max_units
    }

    /// Iterate over the chunks in emission order
    pub fn chunks(&self) -> Chunks {
        Chunks {
            plan: *self,
            remaining: self.units,
            index: 0,
            offset: 0,
        }
    }
}

/// Iterator over the chunks of a [`ChunkPlan`]
#[derive(Debug, Clone)]
pub struct Chunks {
    plan: ChunkPlan,
    remaining: u64,
    index: u64,
    offset: u64,
}

impl Chunks {
    /// Units not yet handed out
    pub fn remaining_units(&self) -> u64 {
        self.remaining
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            return None;
        }

        let units = self.remaining.min(self.plan.max_units as u64);
        let bytes = units << self.plan.shift;
        let chunk = Chunk {
            index: self.index,
            units: units as u32,
            offset: self.offset,
            bytes,
            last: units == self.remaining,
        };

        self.remaining -= units;
        self.index += 1;
        self.offset += bytes;

        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.remaining.div_ceil(self.plan.max_units as u64) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Chunks {}

impl FusedIterator for Chunks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::CP_DMA_MAX_BYTE_COUNT;
    use alloc::vec::Vec;

    #[test]
    fn test_mode_selection() {
        let a = GpuAddr::new(0x1_0000_0000);
        assert_eq!(AddressMode::select(a, a + 4, 8), AddressMode::Dword);
        assert_eq!(AddressMode::select(a + 1, a, 8), AddressMode::Byte);
        assert_eq!(AddressMode::select(a, a + 2, 8), AddressMode::Byte);
        assert_eq!(AddressMode::select(a, a, 7), AddressMode::Byte);
    }

    #[test]
    fn test_chunks_sum_to_size() {
        for &(size, limit) in &[(1u64, 1u32), (10, 3), (12, 4), (0x10_0003, DMA_MAX_COPY_UNITS), (0x4000, 0x1000)] {
            let plan = ChunkPlan::new(size, 0, limit);
            let chunks: Vec<Chunk> = plan.chunks().collect();

            assert_eq!(chunks.len() as u64, size.div_ceil(limit as u64));
            assert_eq!(chunks.len() as u64, plan.chunk_count());
            assert_eq!(chunks.iter().map(|c| c.bytes).sum::<u64>(), size);

            let (last, rest) = chunks.split_last().unwrap();
            assert!(rest.iter().all(|c| c.units == limit && !c.last));
            assert!(last.last);
        }
    }

    #[test]
    fn test_unaligned_dma_copy_split() {
        let plan = ChunkPlan::new(0x0010_0003, AddressMode::Byte.shift(), DMA_MAX_COPY_UNITS);
        let chunks: Vec<Chunk> = plan.chunks().collect();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].bytes, 0x000f_ffff);
        assert_eq!(chunks[1].bytes, 0x4);
        assert_eq!(chunks[1].offset, 0x000f_ffff);
    }

    #[test]
    fn test_dword_units() {
        let plan = ChunkPlan::new(0x40_0000, AddressMode::Dword.shift(), DMA_MAX_COPY_UNITS);
        let chunks: Vec<Chunk> = plan.chunks().collect();

        // 0x100000 dwords: one full packet plus a single dword
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].units, DMA_MAX_COPY_UNITS);
        assert_eq!(chunks[0].bytes, (DMA_MAX_COPY_UNITS as u64) << 2);
        assert_eq!(chunks[1].units, 1);
        assert_eq!(plan.total_bytes(), 0x40_0000);
    }

    #[test]
    fn test_clear_ceiling_split() {
        let plan = ChunkPlan::new(0x40_0000, 0, CP_DMA_MAX_BYTE_COUNT);
        let chunks: Vec<Chunk> = plan.chunks().collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].bytes, CP_DMA_MAX_BYTE_COUNT as u64);
        assert_eq!(chunks[1].bytes, CP_DMA_MAX_BYTE_COUNT as u64);
        assert_eq!(chunks[2].bytes, 0x10);
        assert_eq!(chunks.iter().filter(|c| c.last).count(), 1);
    }

    #[test]
    fn test_exact_multiple_has_no_remainder_chunk() {
        let plan = ChunkPlan::new(0x3000, 0, 0x1000);
        let mut chunks = plan.chunks();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.by_ref().filter(|c| c.bytes == 0x1000).count(), 3);
        assert_eq!(chunks.remaining_units(), 0);
        assert_eq!(chunks.next(), None);
    }

    #[test]
    #[should_panic(expected = "zero-sized transfer")]
    fn test_zero_size_panics() {
        let _ = ChunkPlan::new(0, 0, 16);
    }
}
