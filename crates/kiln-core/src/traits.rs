//! # Kiln Core Traits
//!
//! Seams between the encoder and its collaborators.
//!
//! ```text
//! Synchronizer ──► Flushable          (the other ring, by capability)
//! Emitter      ──► AddressResolver    (buffer object VA lookup)
//! ```

use core::fmt;

use crate::types::{GpuAddr, RingType};

// =============================================================================
// FLUSH CAPABILITY
// =============================================================================

/// How a flush request is carried out by the submission layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushMode {
    /// Queue the buffer for execution and return immediately
    Async,
    /// Queue the buffer and let the submission layer wait for its fence
    Sync,
}

impl fmt::Display for FlushMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async => f.write_str("async"),
            Self::Sync => f.write_str("sync"),
        }
    }
}

/// A command queue that can be asked to submit its outstanding work
///
/// Both rings implement this, so the synchronizer can order one ring against
/// the other without knowing which concrete engine it is talking to.
pub trait Flushable {
    /// Which ring this is
    fn ring_type(&self) -> RingType;

    /// Whether unsubmitted commands are buffered
    fn has_pending_work(&self) -> bool;

    /// Request submission of buffered work.
    ///
    /// Returns the fence value of the submission, or `None` when there was
    /// nothing to submit. Never blocks on GPU completion.
    fn flush(&mut self, mode: FlushMode) -> Option<u64>;
}

// =============================================================================
// ADDRESS RESOLUTION
// =============================================================================

/// Virtual address lookup for a GPU resource
pub trait AddressResolver {
    /// GPU virtual address of `offset` bytes into the resource.
    ///
    /// The result already includes the resource's base address.
    fn resolve_address(&self, offset: u64) -> GpuAddr;
}
