//! # Packet Encoding
//!
//! Pure encoders from typed packet fields to command dwords.
//!
//! Two packet families are produced:
//!
//! ```text
//! DMA ring   [31:28] cmd | [27:20] sub_cmd | [19:0] count        (evergreen)
//!            [31:28] cmd | [23] t | [22] s | [15:0] count        (r6xx/r7xx)
//!
//! GFX ring   [31:30] 3 | [29:16] count | [15:8] opcode | [0] predicate   (PKT3)
//! ```
//!
//! Nothing in here touches a command stream; the emitter decides where the
//! words go.

use kiln_core::GpuAddr;
use static_assertions::const_assert;

use crate::chunk::AddressMode;

// =============================================================================
// DMA RING
// =============================================================================

/// DMA `COPY` packet
pub const DMA_PACKET_COPY: u32 = 0x3;
/// DMA `NOP` packet
pub const DMA_PACKET_NOP: u32 = 0xf;

/// Evergreen DMA copy sub-command: dword-addressed linear copy
pub const DMA_COPY_SUB_DWORD: u32 = 0x00;
/// Evergreen DMA copy sub-command: byte-addressed linear copy
pub const DMA_COPY_SUB_BYTE: u32 = 0x40;

/// Evergreen/Cayman DMA header
#[inline]
pub const fn dma_header(cmd: u32, sub_cmd: u32, count: u32) -> u32 {
    ((cmd & 0xf) << 28) | ((sub_cmd & 0xff) << 20) | (count & 0xf_ffff)
}

/// r6xx/r7xx DMA header
#[inline]
pub const fn r600_dma_header(cmd: u32, t: u32, s: u32, count: u32) -> u32 {
    ((cmd & 0xf) << 28) | ((t & 0x1) << 23) | ((s & 0x1) << 22) | (count & 0xffff)
}

/// DMA packet header layout of a chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DmaLayout {
    /// r6xx/r7xx: 16-bit dword count, no byte mode
    R600,
    /// Evergreen/Cayman: 20-bit count, byte or dword sub-command
    Evergreen,
}

impl DmaLayout {
    /// Command field of a header word
    #[inline]
    pub const fn cmd(self, header: u32) -> u32 {
        header >> 28
    }

    /// Count field of a header word
    #[inline]
    pub const fn count(self, header: u32) -> u32 {
        match self {
            Self::R600 => header & 0xffff,
            Self::Evergreen => header & 0xf_ffff,
        }
    }

    /// Addressing mode encoded in a copy header
    pub const fn copy_mode(self, header: u32) -> AddressMode {
        match self {
            Self::R600 => AddressMode::Dword,
            Self::Evergreen => {
                if (header >> 20) & 0xff == DMA_COPY_SUB_BYTE {
                    AddressMode::Byte
                } else {
                    AddressMode::Dword
                }
            }
        }
    }
}

/// Linear buffer-to-buffer copy on the DMA ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaCopyPacket {
    /// Header layout
    pub layout: DmaLayout,
    /// Unit of `count`
    pub mode: AddressMode,
    /// Units to copy in this packet
    pub count: u32,
    /// Destination address
    pub dst: GpuAddr,
    /// Source address
    pub src: GpuAddr,
}

impl DmaCopyPacket {
    /// Encoded size
    pub const DWORDS: usize = 5;

    /// Encode to command dwords
    pub fn encode(&self) -> [u32; Self::DWORDS] {
        let header = match self.layout {
            DmaLayout::R600 => {
                debug_assert_eq!(self.mode, AddressMode::Dword);
                r600_dma_header(DMA_PACKET_COPY, 0, 0, self.count)
            }
            DmaLayout::Evergreen => dma_header(DMA_PACKET_COPY, self.mode.sub_cmd(), self.count),
        };

        [
            header,
            self.dst.lo(),
            self.src.lo(),
            self.dst.hi() & 0xff,
            self.src.hi() & 0xff,
        ]
    }
}

// =============================================================================
// GFX RING (PKT3)
// =============================================================================

/// PKT3 `NOP`; also carries relocation tokens
pub const PKT3_NOP: u32 = 0x10;
/// PKT3 `CP_DMA`
pub const PKT3_CP_DMA: u32 = 0x41;
/// PKT3 `SURFACE_SYNC`
pub const PKT3_SURFACE_SYNC: u32 = 0x43;
/// PKT3 `EVENT_WRITE`
pub const PKT3_EVENT_WRITE: u32 = 0x46;
/// PKT3 `SET_CONFIG_REG`
pub const PKT3_SET_CONFIG_REG: u32 = 0x68;

/// Type-3 packet header. `count` is the number of body dwords minus one.
#[inline]
pub const fn pkt3(opcode: u32, count: u32, predicate: u32) -> u32 {
    (3 << 30) | ((count & 0x3fff) << 16) | ((opcode & 0xff) << 8) | (predicate & 1)
}

/// Packet type of a GFX header word
#[inline]
pub const fn pkt_type(header: u32) -> u32 {
    header >> 30
}

/// Body length field of a PKT3 header
#[inline]
pub const fn pkt3_count(header: u32) -> u32 {
    (header >> 16) & 0x3fff
}

/// Opcode of a PKT3 header
#[inline]
pub const fn pkt3_opcode(header: u32) -> u32 {
    (header >> 8) & 0xff
}

/// CP_DMA: hold the CP until the transfer has landed in memory
pub const CP_DMA_CP_SYNC: u32 = 1 << 31;

/// CP_DMA source select field
#[inline]
pub const fn cp_dma_src_sel(sel: u32) -> u32 {
    (sel & 0x3) << 29
}

/// CP_DMA source select: memory address
pub const CP_DMA_SRC_SEL_ADDR: u32 = 0;
/// CP_DMA source select: 32-bit immediate fill value
pub const CP_DMA_SRC_SEL_DATA: u32 = 2;

/// Largest byte count one CP_DMA packet may move
pub const CP_DMA_MAX_BYTE_COUNT: u32 = (1 << 21) - 8;

/// Mask of the CP_DMA `BYTE_COUNT` field
pub const CP_DMA_BYTE_COUNT_MASK: u32 = 0x1f_ffff;

const_assert!(CP_DMA_MAX_BYTE_COUNT <= CP_DMA_BYTE_COUNT_MASK);

/// Where a CP_DMA packet reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpDmaSource {
    /// Replicate an immediate 32-bit value
    Data(u32),
    /// Read from memory
    Address(GpuAddr),
}

/// CP_DMA transfer on the GFX ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpDmaPacket {
    /// Source of the data
    pub source: CpDmaSource,
    /// Destination address
    pub dst: GpuAddr,
    /// Bytes to write, at most [`CP_DMA_MAX_BYTE_COUNT`]
    pub byte_count: u32,
    /// Set `CP_SYNC`
    pub sync: bool,
}

impl CpDmaPacket {
    /// Encoded size
    pub const DWORDS: usize = 6;

    /// Encode to command dwords
    pub fn encode(&self) -> [u32; Self::DWORDS] {
        debug_assert!(self.byte_count <= CP_DMA_MAX_BYTE_COUNT);

        let sync = if self.sync { CP_DMA_CP_SYNC } else { 0 };

        // DATA/SRC_ADDR_LO [31:0], then CP_SYNC [31] | SRC_SEL [30:29] | SRC_ADDR_HI [7:0]
        let (word1, word2) = match self.source {
            CpDmaSource::Data(value) => (value, sync | cp_dma_src_sel(CP_DMA_SRC_SEL_DATA)),
            CpDmaSource::Address(src) => (
                src.lo(),
                sync | cp_dma_src_sel(CP_DMA_SRC_SEL_ADDR) | (src.hi() & 0xff),
            ),
        };

        [
            pkt3(PKT3_CP_DMA, 4, 0),
            word1,
            word2,
            self.dst.lo(),
            self.dst.hi() & 0xff,
            self.byte_count & CP_DMA_BYTE_COUNT_MASK,
        ]
    }
}

/// NOP carrying a relocation token for the packet before it
#[inline]
pub const fn nop_reloc(token: u32) -> [u32; 2] {
    [pkt3(PKT3_NOP, 0, 0), token]
}
