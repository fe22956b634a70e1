//! # Cache Flush Sequence
//!
//! GFX-ring packets that write back and invalidate caches and wait for the
//! 3D pipe to drain before a transfer touches memory.
//!
//! Hardware order:
//!
//! ```text
//! EVENT_WRITE  CACHE_FLUSH_AND_INV      (colour / depth only)
//! SURFACE_SYNC coher_cntl, full range   (any cache)
//! SET_CONFIG_REG WAIT_UNTIL 3D idle     (always last)
//! ```

use arrayvec::ArrayVec;
use kiln_mem::CacheFlags;
use static_assertions::const_assert;

use crate::packet::{pkt3, PKT3_EVENT_WRITE, PKT3_SET_CONFIG_REG, PKT3_SURFACE_SYNC};

/// Upper bound on the dwords one flush sequence takes
pub const MAX_FLUSH_DWORDS: usize = 16;

/// `EVENT_TYPE` of the colour/depth write-back-and-invalidate event
pub const CACHE_FLUSH_AND_INV_EVENT: u32 = 0x16;

/// SURFACE_SYNC `CP_COHER_CNTL` action bits
pub mod coher {
    /// Texture cache
    pub const TC_ACTION_ENA: u32 = 1 << 23;
    /// Vertex cache
    pub const VC_ACTION_ENA: u32 = 1 << 24;
    /// Colour buffer
    pub const CB_ACTION_ENA: u32 = 1 << 25;
    /// Depth buffer
    pub const DB_ACTION_ENA: u32 = 1 << 26;
    /// Shader / constant cache
    pub const SH_ACTION_ENA: u32 = 1 << 27;
    /// Stream-out
    pub const SMX_ACTION_ENA: u32 = 1 << 28;
}

/// Config register space base
pub const CONFIG_REG_OFFSET: u32 = 0x8000;
/// `WAIT_UNTIL` register
pub const R_008040_WAIT_UNTIL: u32 = 0x8040;
/// `WAIT_UNTIL.WAIT_3D_IDLE`
pub const WAIT_3D_IDLE: u32 = 1 << 15;

/// Coherency poll interval for SURFACE_SYNC
const SURFACE_SYNC_POLL_INTERVAL: u32 = 0xA;

const EVENT_WRITE_DWORDS: usize = 2;
const SURFACE_SYNC_DWORDS: usize = 5;
const WAIT_UNTIL_DWORDS: usize = 3;

const_assert!(EVENT_WRITE_DWORDS + SURFACE_SYNC_DWORDS + WAIT_UNTIL_DWORDS <= MAX_FLUSH_DWORDS);

/// Encoded flush sequence
pub type FlushSequence = ArrayVec<u32, MAX_FLUSH_DWORDS>;

/// `CP_COHER_CNTL` value for `caches`
pub fn coher_cntl(caches: CacheFlags) -> u32 {
    let mut cntl = 0;

    if caches.contains(CacheFlags::TEXTURE) {
        cntl |= coher::TC_ACTION_ENA;
    }
    if caches.contains(CacheFlags::VERTEX) {
        cntl |= coher::VC_ACTION_ENA;
    }
    if caches.contains(CacheFlags::COLOR) {
        cntl |= coher::CB_ACTION_ENA;
    }
    if caches.contains(CacheFlags::DEPTH) {
        cntl |= coher::DB_ACTION_ENA;
    }
    if caches.contains(CacheFlags::CONSTANT) {
        cntl |= coher::SH_ACTION_ENA;
    }
    if caches.contains(CacheFlags::STREAMOUT) {
        cntl |= coher::SMX_ACTION_ENA;
    }

    cntl
}

/// Encode the flush of `caches`, followed by a 3D idle wait when
/// `wait_idle` is set.
///
/// Empty when there is nothing to do.
pub fn flush_sequence(caches: CacheFlags, wait_idle: bool) -> FlushSequence {
    let mut seq = FlushSequence::new();

    if caches.intersects(CacheFlags::COLOR | CacheFlags::DEPTH) {
        seq.push(pkt3(PKT3_EVENT_WRITE, 0, 0));
        seq.push(CACHE_FLUSH_AND_INV_EVENT);
    }

    if !caches.is_empty() {
        seq.push(pkt3(PKT3_SURFACE_SYNC, 3, 0));
        seq.push(coher_cntl(caches));
        seq.push(0xffff_ffff);
        seq.push(0);
        seq.push(SURFACE_SYNC_POLL_INTERVAL);
    }

    if wait_idle {
        seq.push(pkt3(PKT3_SET_CONFIG_REG, 1, 0));
        seq.push((R_008040_WAIT_UNTIL - CONFIG_REG_OFFSET) >> 2);
        seq.push(WAIT_3D_IDLE);
    }

    seq
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::pkt3_opcode;

    #[test]
    fn test_nothing_to_flush() {
        assert!(flush_sequence(CacheFlags::empty(), false).is_empty());
    }

    #[test]
    fn test_texture_flush_with_idle() {
        let seq = flush_sequence(CacheFlags::TEXTURE, true);
        assert_eq!(
            seq.as_slice(),
            &[
                pkt3(PKT3_SURFACE_SYNC, 3, 0),
                coher::TC_ACTION_ENA,
                0xffff_ffff,
                0,
                0xA,
                pkt3(PKT3_SET_CONFIG_REG, 1, 0),
                0x10,
                WAIT_3D_IDLE,
            ]
        );
    }

    #[test]
    fn test_color_flush_starts_with_event() {
        let seq = flush_sequence(CacheFlags::COLOR | CacheFlags::VERTEX, true);
        assert_eq!(pkt3_opcode(seq[0]), PKT3_EVENT_WRITE);
        assert_eq!(seq[1], CACHE_FLUSH_AND_INV_EVENT);
        assert_eq!(pkt3_opcode(seq[2]), PKT3_SURFACE_SYNC);
        assert_eq!(seq[3], coher::CB_ACTION_ENA | coher::VC_ACTION_ENA);
        assert_eq!(pkt3_opcode(seq[7]), PKT3_SET_CONFIG_REG);
        assert_eq!(seq.len(), 10);
    }

    #[test]
    fn test_all_caches_fit() {
        let seq = flush_sequence(CacheFlags::all(), true);
        assert!(seq.len() <= MAX_FLUSH_DWORDS);
        assert_eq!(
            coher_cntl(CacheFlags::all()),
            coher::TC_ACTION_ENA
                | coher::VC_ACTION_ENA
                | coher::CB_ACTION_ENA
                | coher::DB_ACTION_ENA
                | coher::SH_ACTION_ENA
                | coher::SMX_ACTION_ENA
        );
    }
}
