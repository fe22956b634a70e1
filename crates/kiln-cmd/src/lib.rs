//! # Kiln Command Encoding
//!
//! Buffer copy and clear encoding for the GFX (CP) and DMA rings of
//! r600-family GPUs.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                           Context                                 │
//! │        copy_buffer / clear_buffer  (engine choice, retry)         │
//! │                                                                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────────┐     │
//! │  │  Plan        │    │ Synchronizer │    │   Emitter        │     │
//! │  │ (chunk.rs)   │───▶│  (sync.rs,   │───▶│  (emit.rs,       │     │
//! │  │              │    │   flush.rs)  │    │   packet.rs)     │     │
//! │  └──────────────┘    └──────┬───────┘    └────────┬─────────┘     │
//! │                             │ reserve             │ words, relocs │
//! │                     ┌───────▼─────────────────────▼────────┐      │
//! │                     │   Ring (stream.rs, reloc.rs, ring.rs) │      │
//! │                     └───────────────────┬──────────────────┘      │
//! └─────────────────────────────────────────┼─────────────────────────┘
//!                                           ▼ Submission (fence)
//! ```
//!
//! ## Operation Flow
//!
//! 1. The context picks an engine and builds a chunk plan
//! 2. The synchronizer reserves the whole budget, flushes the other ring and
//!    writes the cache flush sequence if one is owed
//! 3. The emitter writes relocations and packets chunk by chunk, with the
//!    completion sync on the last CP DMA chunk
//! 4. The destination is marked dirty and its valid range grows

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod chunk;
pub mod context;
pub mod emit;
pub mod flush;
pub mod packet;
pub mod reloc;
pub mod ring;
pub mod stream;
pub mod sync;
pub mod validate;

// Re-exports
pub use chunk::{AddressMode, Chunk, ChunkPlan};
pub use context::{ChipCaps, ChipFamily, Context, ContextConfig, EngineHint};
pub use emit::{ClearPlan, CopyEngine, CopyPlan};
pub use packet::DmaLayout;
pub use reloc::{RelocBuffer, RelocRecord, RelocationTable, Usage};
pub use ring::{Ring, RingConfig, RingStats, Submission};
pub use stream::{CommandStream, CsWriter};
pub use sync::{Budget, EngineState};
