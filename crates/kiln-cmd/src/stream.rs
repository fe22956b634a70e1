//! # Command Stream
//!
//! The in-progress command buffer of one ring and its relocation table.
//!
//! Space is reserved once per operation, up front:
//!
//! ```text
//! words: [ submitted-later .......... | reserved (CsWriter) | free ]
//!        0                            cdw                  cdw+budget   capacity
//! ```
//!
//! A reservation either fits entirely or fails with no change to the
//! stream, so an operation never leaves a partial packet sequence behind.

use alloc::vec::Vec;

use kiln_core::{Error, Result, RingType};
use kiln_mem::BufferObject;

use crate::reloc::{RelocationTable, Usage};

// =============================================================================
// COMMAND STREAM
// =============================================================================

/// Command buffer of one ring
#[derive(Debug)]
pub struct CommandStream {
    /// Ring the buffer will be submitted to
    ring: RingType,
    /// Encoded dwords
    words: Vec<u32>,
    /// Maximum dwords in one submission
    capacity: usize,
    /// Buffers referenced by `words`
    relocs: RelocationTable,
}

impl CommandStream {
    /// Create an empty stream of `capacity` dwords
    pub fn new(ring: RingType, capacity: usize) -> Self {
        Self {
            ring,
            words: Vec::with_capacity(capacity),
            capacity,
            relocs: RelocationTable::new(),
        }
    }

    /// Get ring type
    pub fn ring_type(&self) -> RingType {
        self.ring
    }

    /// Current dword count
    pub fn cdw(&self) -> usize {
        self.words.len()
    }

    /// Get capacity in dwords
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Dwords that can still be reserved
    pub fn free_words(&self) -> usize {
        self.capacity - self.words.len()
    }

    /// Encoded dwords
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Relocation table
    pub fn relocations(&self) -> &RelocationTable {
        &self.relocs
    }

    /// Whether nothing has been encoded
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Check that `words` more dwords would fit
    pub fn check_space(&self, words: usize) -> Result<()> {
        if words > self.capacity {
            Err(Error::ExceedsRingCapacity)
        } else if words > self.free_words() {
            Err(Error::CommandBufferFull)
        } else {
            Ok(())
        }
    }

    /// Reserve `words` dwords for one operation
    pub fn reserve(&mut self, words: usize) -> Result<CsWriter<'_>> {
        self.check_space(words)?;

        let start = self.words.len();
        Ok(CsWriter {
            cs: self,
            start,
            budget: words,
        })
    }

    /// Take the encoded words and relocations, leaving the stream empty
    pub fn take(&mut self) -> (Vec<u32>, RelocationTable) {
        let words = core::mem::replace(&mut self.words, Vec::with_capacity(self.capacity));
        let relocs = core::mem::take(&mut self.relocs);
        (words, relocs)
    }
}

// =============================================================================
// WRITER
// =============================================================================

/// Write access to a reservation in a [`CommandStream`]
#[derive(Debug)]
pub struct CsWriter<'a> {
    cs: &'a mut CommandStream,
    start: usize,
    budget: usize,
}

impl CsWriter<'_> {
    /// Ring being written
    pub fn ring_type(&self) -> RingType {
        self.cs.ring
    }

    /// Stream position of the next dword
    pub fn cursor(&self) -> usize {
        self.cs.words.len()
    }

    /// Dwords written through this writer
    pub fn written(&self) -> usize {
        self.cs.words.len() - self.start
    }

    /// Reserved dwords not yet written
    pub fn remaining(&self) -> usize {
        self.budget - self.written()
    }

    /// Append one dword
    #[inline]
    pub fn emit(&mut self, word: u32) {
        debug_assert!(self.remaining() >= 1, "write past reservation");
        self.cs.words.push(word);
    }

    /// Append dwords
    #[inline]
    pub fn emit_slice(&mut self, words: &[u32]) {
        debug_assert!(self.remaining() >= words.len(), "write past reservation");
        self.cs.words.extend_from_slice(words);
    }

    /// Declare `buffer` for the packet about to be written.
    ///
    /// Returns the relocation token.
    pub fn add_reloc(&mut self, buffer: &BufferObject, usage: Usage) -> u32 {
        let cursor = self.cs.words.len();
        self.cs.relocs.add(buffer, usage, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{BufferHandle, GpuAddr};

    #[test]
    fn test_reserve_is_all_or_nothing() {
        let mut cs = CommandStream::new(RingType::Dma, 16);
        {
            let mut w = cs.reserve(10).unwrap();
            w.emit_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
            assert_eq!(w.remaining(), 0);
        }

        assert_eq!(cs.reserve(7).unwrap_err(), Error::CommandBufferFull);
        assert_eq!(cs.cdw(), 10);
        assert_eq!(cs.reserve(17).unwrap_err(), Error::ExceedsRingCapacity);
        assert!(cs.reserve(6).is_ok());
    }

    #[test]
    fn test_reloc_cursor_is_packet_start() {
        let bo = BufferObject::new(BufferHandle::new(3), GpuAddr::new(0x1_0000_0000), 64);
        let mut cs = CommandStream::new(RingType::Gfx, 64);
        {
            let mut w = cs.reserve(8).unwrap();
            w.emit_slice(&[0, 0]);
            let token = w.add_reloc(&bo, Usage::WRITE);
            assert_eq!(token, 0);
            w.emit(0xffff_ffff);
            assert_eq!(w.written(), 3);
        }

        assert_eq!(cs.relocations().records()[0].cursor, 2);
    }

    #[test]
    fn test_take_resets_stream() {
        let bo = BufferObject::new(BufferHandle::new(1), GpuAddr::new(0x1000), 64);
        let mut cs = CommandStream::new(RingType::Gfx, 8);
        {
            let mut w = cs.reserve(2).unwrap();
            w.add_reloc(&bo, Usage::READ);
            w.emit_slice(&[7, 8]);
        }

        let (words, relocs) = cs.take();
        assert_eq!(words, [7, 8]);
        assert_eq!(relocs.buffers().len(), 1);
        assert!(cs.is_empty());
        assert!(cs.relocations().is_empty());
        assert_eq!(cs.free_words(), 8);
    }
}
