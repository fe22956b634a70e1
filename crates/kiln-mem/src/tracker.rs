//! # Buffer Table
//!
//! Hands out buffer handles and GPU virtual addresses, and keeps the buffer
//! objects reachable by handle.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;

use kiln_core::{BufferHandle, Error, GpuAddr, Result};

use crate::buffer::BufferObject;

/// GPU page size used for VA placement
pub const GPU_PAGE_SIZE: u64 = 4096;

/// Default start of the buffer VA window (above 4 GiB, so the high address
/// bits in packets are exercised)
pub const DEFAULT_VA_BASE: u64 = 0x1_0000_0000;

/// Packets carry 8 high address bits: 40-bit virtual addresses
pub const VA_LIMIT: u64 = 1 << 40;

// =============================================================================
// BUFFER TABLE
// =============================================================================

/// Tracks buffer objects by handle
#[derive(Debug)]
pub struct BufferTable {
    /// All live buffers
    buffers: BTreeMap<BufferHandle, Arc<BufferObject>>,
    /// Next buffer ID
    next_id: u64,
    /// Next free VA (page aligned, bump allocated)
    next_va: u64,
    /// Statistics
    stats: TrackerStats,
}

/// Table statistics
#[derive(Debug, Clone, Default)]
pub struct TrackerStats {
    /// Total buffers created
    pub total_created: u64,
    /// Total buffers destroyed
    pub total_destroyed: u64,
    /// Bytes of live buffers
    pub memory_in_use: u64,
}

impl BufferTable {
    /// Create a table allocating VAs from [`DEFAULT_VA_BASE`]
    pub fn new() -> Self {
        Self::with_va_base(DEFAULT_VA_BASE)
    }

    /// Create a table allocating VAs from `base`
    pub fn with_va_base(base: u64) -> Self {
        Self {
            buffers: BTreeMap::new(),
            next_id: 1,
            next_va: base.next_multiple_of(GPU_PAGE_SIZE),
            stats: TrackerStats::default(),
        }
    }

    /// Create a buffer of `size` bytes
    pub fn create(&mut self, size: u64) -> Result<Arc<BufferObject>> {
        if size == 0 {
            return Err(Error::InvalidParameter);
        }

        let span = size
            .checked_next_multiple_of(GPU_PAGE_SIZE)
            .ok_or(Error::OutOfAddressSpace)?;
        let end = self
            .next_va
            .checked_add(span)
            .filter(|&end| end <= VA_LIMIT)
            .ok_or(Error::OutOfAddressSpace)?;

        let handle = BufferHandle::new(self.next_id);
        self.next_id += 1;

        let bo = Arc::new(BufferObject::new(handle, GpuAddr::new(self.next_va), size));
        self.next_va = end;

        self.stats.total_created += 1;
        self.stats.memory_in_use += size;

        log::debug!("created buffer {:?} at {} ({} bytes)", handle, bo.va(), size);

        self.buffers.insert(handle, Arc::clone(&bo));
        Ok(bo)
    }

    /// Get buffer by handle
    pub fn get(&self, handle: BufferHandle) -> Option<&Arc<BufferObject>> {
        self.buffers.get(&handle)
    }

    /// Drop the table's reference to a buffer
    pub fn destroy(&mut self, handle: BufferHandle) -> Result<Arc<BufferObject>> {
        let bo = self.buffers.remove(&handle).ok_or(Error::InvalidParameter)?;

        self.stats.total_destroyed += 1;
        self.stats.memory_in_use -= bo.size();

        log::debug!("destroyed buffer {:?}", handle);
        Ok(bo)
    }

    /// Get statistics
    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    /// Get number of live buffers
    pub fn active_count(&self) -> usize {
        self.buffers.len()
    }

    /// Iterate over all buffers
    pub fn iter(&self) -> impl Iterator<Item = &Arc<BufferObject>> {
        self.buffers.values()
    }
}

impl Default for BufferTable {
    fn default() -> Self {
        Self::new()
    }
}
