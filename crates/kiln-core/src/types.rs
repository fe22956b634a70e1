//! # Kiln Core Types
//!
//! Fundamental type definitions used across the encoder stack.
//!
//! These types provide:
//! - Strong typing for GPU virtual addresses
//! - Type-safe resource handles
//! - Ring identity

use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::{Add, Sub};

// =============================================================================
// GPU ADDRESS
// =============================================================================

/// GPU Virtual Address
///
/// This is an address in the GPU's virtual address space.
/// It is NOT a CPU pointer and cannot be dereferenced directly.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct GpuAddr(u64);

impl GpuAddr {
    /// Create a new GPU address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Create a null GPU address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check alignment
    #[inline]
    pub const fn is_aligned(self, alignment: u64) -> bool {
        self.0 & (alignment - 1) == 0
    }

    /// Offset by bytes
    #[inline]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }

    /// Low 32 bits, as carried in the `*_ADDR_LO` packet fields
    #[inline]
    pub const fn lo(self) -> u32 {
        self.0 as u32
    }

    /// High 32 bits; packets carry only the bottom 8 of them
    #[inline]
    pub const fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl Add<u64> for GpuAddr {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl Sub<GpuAddr> for GpuAddr {
    type Output = u64;

    fn sub(self, rhs: GpuAddr) -> Self::Output {
        self.0.wrapping_sub(rhs.0)
    }
}

impl fmt::Debug for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GpuAddr(0x{:010x})", self.0)
    }
}

impl fmt::Display for GpuAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:010x}", self.0)
    }
}

// =============================================================================
// HANDLE TYPES
// =============================================================================

/// Opaque handle to a GPU resource
///
/// Handles are type-safe wrappers that prevent mixing different resource types.
#[repr(transparent)]
pub struct Handle<T> {
    id: u64,
    _marker: core::marker::PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// Create a new handle
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self {
            id,
            _marker: core::marker::PhantomData,
        }
    }

    /// Create a null handle
    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Get the raw ID
    #[inline]
    pub const fn id(self) -> u64 {
        self.id
    }

    /// Check if null
    #[inline]
    pub const fn is_null(self) -> bool {
        self.id == 0
    }
}

// Manual impls: the marker type never needs to implement anything.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Handle<{}>(0x{:x})",
            core::any::type_name::<T>(),
            self.id
        )
    }
}

/// Marker for buffer handle
#[derive(Debug)]
pub struct BufferMarker;

/// Handle to a GPU buffer
pub type BufferHandle = Handle<BufferMarker>;

// =============================================================================
// RING IDENTITY
// =============================================================================

/// The two hardware queues a context submits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingType {
    /// Graphics/compute command processor ring (CP, PKT3 packets)
    Gfx,
    /// Asynchronous DMA copy engine ring
    Dma,
}

impl RingType {
    /// The ring that may race with work on this one
    #[inline]
    pub const fn other(self) -> Self {
        match self {
            Self::Gfx => Self::Dma,
            Self::Dma => Self::Gfx,
        }
    }

    /// Short name used in log output
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gfx => "gfx",
            Self::Dma => "dma",
        }
    }
}

impl fmt::Display for RingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_halves() {
        let addr = GpuAddr::new(0x12_3456_789a);
        assert_eq!(addr.lo(), 0x3456_789a);
        assert_eq!(addr.hi(), 0x12);
        assert_eq!((addr + 0x10).raw(), 0x12_3456_78aa);
        assert_eq!(GpuAddr::new(0x1_0000_0010) - GpuAddr::new(0x1_0000_0000), 0x10);
    }

    #[test]
    fn test_address_alignment() {
        assert!(GpuAddr::new(0x1000).is_aligned(4));
        assert!(!GpuAddr::new(0x1001).is_aligned(4));
        assert!(GpuAddr::null().is_null());
    }

    #[test]
    fn test_handle_identity() {
        let a = BufferHandle::new(3);
        let b = BufferHandle::new(3);
        assert_eq!(a, b);
        assert!(BufferHandle::new(2) < a);
        assert!(BufferHandle::null().is_null());
    }

    #[test]
    fn test_ring_other() {
        assert_eq!(RingType::Gfx.other(), RingType::Dma);
        assert_eq!(RingType::Dma.other(), RingType::Gfx);
    }
}
