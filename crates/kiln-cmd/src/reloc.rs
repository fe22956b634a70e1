//! # Relocation Table
//!
//! Buffers referenced by a command stream, declared before the packets that
//! embed their addresses.
//!
//! Every insertion is kept as a [`RelocRecord`] with the stream position it
//! was made at. The kernel-facing buffer list ([`RelocBuffer`]) is
//! de-duplicated: a buffer appears once, with the union of its usages.

use alloc::vec::Vec;
use core::ops::Range;

use bitflags::bitflags;
use hashbrown::HashMap;
use kiln_core::BufferHandle;
use kiln_mem::BufferObject;

/// Dwords per relocation entry in the kernel submission chunk
pub const RELOC_DWORDS: u32 = 4;

bitflags! {
    /// How a packet accesses a relocated buffer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Usage: u8 {
        /// Read by the GPU
        const READ = 1 << 0;
        /// Written by the GPU
        const WRITE = 1 << 1;
        /// Read and written
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A buffer in the submission's buffer list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocBuffer {
    /// Buffer handle
    pub handle: BufferHandle,
    /// GPU VA range of the buffer
    pub va_range: Range<u64>,
    /// Union of all declared usages
    pub usage: Usage,
}

/// One relocation insertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocRecord {
    /// Buffer handle
    pub handle: BufferHandle,
    /// Declared usage
    pub usage: Usage,
    /// Index into the buffer list
    pub index: u32,
    /// Stream dword position when the record was inserted
    pub cursor: usize,
}

/// Relocations of one command stream
#[derive(Debug, Default)]
pub struct RelocationTable {
    buffers: Vec<RelocBuffer>,
    lookup: HashMap<BufferHandle, u32>,
    records: Vec<RelocRecord>,
}

impl RelocationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `buffer` with `usage` at stream position `cursor`.
    ///
    /// Returns the token packets embed to refer to the buffer.
    pub fn add(&mut self, buffer: &BufferObject, usage: Usage, cursor: usize) -> u32 {
        let handle = buffer.handle();

        let index = match self.lookup.get(&handle) {
            Some(&index) => {
                self.buffers[index as usize].usage |= usage;
                index
            }
            None => {
                let index = self.buffers.len() as u32;
                self.buffers.push(RelocBuffer {
                    handle,
                    va_range: buffer.va_range(),
                    usage,
                });
                self.lookup.insert(handle, index);
                index
            }
        };

        self.records.push(RelocRecord {
            handle,
            usage,
            index,
            cursor,
        });

        index * RELOC_DWORDS
    }

    /// De-duplicated buffer list
    pub fn buffers(&self) -> &[RelocBuffer] {
        &self.buffers
    }

    /// Every insertion, in order
    pub fn records(&self) -> &[RelocRecord] {
        &self.records
    }

    /// Buffer named by a packet token
    pub fn buffer_for_token(&self, token: u32) -> Option<&RelocBuffer> {
        if token % RELOC_DWORDS != 0 {
            return None;
        }
        self.buffers.get((token / RELOC_DWORDS) as usize)
    }

    /// Whether a record inserted at or before `cursor` covers
    /// `range` of GPU VA with at least `usage`
    pub fn covers(&self, range: Range<u64>, usage: Usage, cursor: usize) -> bool {
        self.records
            .iter()
            .take_while(|r| r.cursor <= cursor)
            .any(|r| {
                let va = &self.buffers[r.index as usize].va_range;
                r.usage.contains(usage) && va.start <= range.start && range.end <= va.end
            })
    }

    /// Whether nothing was declared
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Forget all relocations
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.lookup.clear();
        self.records.clear();
    }
}
