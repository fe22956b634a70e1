//! # Command Stream Validation
//!
//! Decodes a command stream and checks that it is something the kernel
//! would accept: every packet is known and complete, every address a
//! transfer packet embeds is covered by a relocation declared at or before
//! the packet start, and every NOP token names a declared buffer.
//!
//! Runs on every ring flush with the `validation` feature, and from tests.

use kiln_core::{Error, Result, RingType};

use crate::packet::{
    pkt3_count, pkt3_opcode, pkt_type, DmaLayout, CP_DMA_BYTE_COUNT_MASK, CP_DMA_SRC_SEL_ADDR,
    DMA_PACKET_COPY, DMA_PACKET_NOP, PKT3_CP_DMA, PKT3_EVENT_WRITE, PKT3_NOP,
    PKT3_SET_CONFIG_REG, PKT3_SURFACE_SYNC,
};
use crate::reloc::{RelocationTable, Usage};
use crate::stream::CommandStream;

/// Check the consistency of `cs`. `layout` decodes DMA ring headers.
pub fn check_stream(cs: &CommandStream, layout: DmaLayout) -> Result<()> {
    match cs.ring_type() {
        RingType::Gfx => check_gfx(cs.words(), cs.relocations()),
        RingType::Dma => check_dma(cs.words(), cs.relocations(), layout),
    }
}

fn addr40(lo: u32, hi: u32) -> u64 {
    lo as u64 | (((hi & 0xff) as u64) << 32)
}

fn require(relocs: &RelocationTable, start: u64, bytes: u64, usage: Usage, pos: usize) -> Result<()> {
    if relocs.covers(start..start + bytes, usage, pos) {
        Ok(())
    } else {
        log::debug!("no {:?} relocation for {:#x}+{:#x} at dword {}", usage, start, bytes, pos);
        Err(Error::MissingRelocation)
    }
}

fn check_gfx(words: &[u32], relocs: &RelocationTable) -> Result<()> {
    let mut pos = 0;

    while pos < words.len() {
        let header = words[pos];
        if pkt_type(header) != 3 {
            return Err(Error::InvalidCommand);
        }

        let len = pkt3_count(header) as usize + 2;
        let body = words.get(pos + 1..pos + len).ok_or(Error::InvalidCommand)?;

        match pkt3_opcode(header) {
            PKT3_CP_DMA => {
                if body.len() != 5 {
                    return Err(Error::InvalidCommand);
                }
                let bytes = (body[4] & CP_DMA_BYTE_COUNT_MASK) as u64;
                require(relocs, addr40(body[2], body[3]), bytes, Usage::WRITE, pos)?;
                if (body[1] >> 29) & 0x3 == CP_DMA_SRC_SEL_ADDR {
                    require(relocs, addr40(body[0], body[1]), bytes, Usage::READ, pos)?;
                }
            }
            PKT3_NOP => {
                if body.len() == 1 && relocs.buffer_for_token(body[0]).is_none() {
                    return Err(Error::MissingRelocation);
                }
            }
            PKT3_EVENT_WRITE | PKT3_SURFACE_SYNC | PKT3_SET_CONFIG_REG => {}
            _ => return Err(Error::InvalidCommand),
        }

        pos += len;
    }

    Ok(())
}

fn check_dma(words: &[u32], relocs: &RelocationTable, layout: DmaLayout) -> Result<()> {
    let mut pos = 0;

    while pos < words.len() {
        let header = words[pos];

        match layout.cmd(header) {
            DMA_PACKET_COPY => {
                let body = words.get(pos + 1..pos + 5).ok_or(Error::InvalidCommand)?;
                let bytes = (layout.count(header) as u64) << layout.copy_mode(header).shift();
                require(relocs, addr40(body[0], body[2]), bytes, Usage::WRITE, pos)?;
                require(relocs, addr40(body[1], body[3]), bytes, Usage::READ, pos)?;
                pos += 5;
            }
            DMA_PACKET_NOP => pos += 1,
            _ => return Err(Error::InvalidCommand),
        }
    }

    Ok(())
}
