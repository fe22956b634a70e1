//! # Buffer Object
//!
//! A linear GPU buffer with the state the transfer encoder consults.

use alloc::vec::Vec;
use core::ops::Range;
use core::sync::atomic::{AtomicU32, Ordering};

use kiln_core::{AddressResolver, BufferHandle, GpuAddr};
use spin::RwLock;

use crate::cache::{BindFlags, CacheFlags};
use crate::range::ValidRangeSet;

// =============================================================================
// BUFFER OBJECT
// =============================================================================

/// A tracked buffer object
///
/// Shared between the context that encodes transfers and the subsystems that
/// bind it, map it, or read back from it. The encoder is the only writer of
/// the valid-range set.
#[derive(Debug)]
pub struct BufferObject {
    /// Unique ID
    handle: BufferHandle,
    /// Base GPU virtual address
    va: GpuAddr,
    /// Size in bytes
    size: u64,
    /// Current pipeline bindings (`BindFlags` bits)
    bindings: AtomicU32,
    /// Caches holding data not yet flushed (`CacheFlags` bits)
    dirty: AtomicU32,
    /// Bytes holding defined contents
    valid: RwLock<ValidRangeSet>,
}

impl BufferObject {
    /// Create a buffer object at a fixed virtual address
    pub fn new(handle: BufferHandle, va: GpuAddr, size: u64) -> Self {
        Self {
            handle,
            va,
            size,
            bindings: AtomicU32::new(0),
            dirty: AtomicU32::new(0),
            valid: RwLock::new(ValidRangeSet::new()),
        }
    }

    /// Get buffer handle
    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    /// Get base GPU address
    pub fn va(&self) -> GpuAddr {
        self.va
    }

    /// Get size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU address range spanned by the buffer
    pub fn va_range(&self) -> Range<u64> {
        self.va.raw()..self.va.raw() + self.size
    }

    // =========================================================================
    // Bindings
    // =========================================================================

    /// Current pipeline bindings
    pub fn bindings(&self) -> BindFlags {
        BindFlags::from_bits_truncate(self.bindings.load(Ordering::Acquire))
    }

    /// Record that the buffer was bound at `bind`
    pub fn bind(&self, bind: BindFlags) {
        self.bindings.fetch_or(bind.bits(), Ordering::AcqRel);
    }

    /// Record that the buffer was unbound from `bind`
    pub fn unbind(&self, bind: BindFlags) {
        self.bindings.fetch_and(!bind.bits(), Ordering::AcqRel);
    }

    // =========================================================================
    // Cache state
    // =========================================================================

    /// Caches that may hold unflushed data for this buffer
    pub fn dirty_caches(&self) -> CacheFlags {
        CacheFlags::from_bits_truncate(self.dirty.load(Ordering::Acquire))
    }

    /// Mark `caches` as needing a flush before the next access through
    /// another path
    pub fn mark_cache_dirty(&self, caches: CacheFlags) {
        self.dirty.fetch_or(caches.bits(), Ordering::AcqRel);
    }

    /// Clear the dirty flags in `caches`, returning the flags that were set
    /// before. Flags outside `caches` are kept.
    pub fn clear_cache_dirty(&self, caches: CacheFlags) -> CacheFlags {
        CacheFlags::from_bits_truncate(self.dirty.fetch_and(!caches.bits(), Ordering::AcqRel))
    }

    // =========================================================================
    // Valid ranges
    // =========================================================================

    /// Record that `range` now holds defined contents
    pub fn add_valid_range(&self, range: Range<u64>) {
        debug_assert!(range.end <= self.size, "valid range past end of buffer");
        self.valid.write().add(range);
    }

    /// Whether every byte of `range` holds defined contents
    pub fn is_range_valid(&self, range: Range<u64>) -> bool {
        self.valid.read().contains(range)
    }

    /// Whether any byte of `range` holds defined contents
    pub fn is_range_initialized(&self, range: Range<u64>) -> bool {
        self.valid.read().intersects(range)
    }

    /// Snapshot of the valid intervals
    pub fn valid_ranges(&self) -> Vec<Range<u64>> {
        self.valid.read().iter().cloned().collect()
    }

    /// Drop all valid ranges, e.g. after the storage was reallocated
    pub fn invalidate_valid_ranges(&self) {
        self.valid.write().clear();
    }
}

impl AddressResolver for BufferObject {
    fn resolve_address(&self, offset: u64) -> GpuAddr {
        debug_assert!(offset <= self.size, "offset past end of buffer");
        self.va.offset(offset)
    }
}
