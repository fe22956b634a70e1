//! # Kiln Memory
//!
//! Buffer objects as seen by the transfer encoder.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Buffer Table                             │
//! │            (handle + GPU VA allocation, lookup)                 │
//! └───────────────────────────────┬─────────────────────────────────┘
//!                                 │ Arc<BufferObject>
//! ┌───────────────────────────────▼─────────────────────────────────┐
//! │                        Buffer Object                            │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌──────────────────┐   │
//! │  │  Bindings    │  │  Dirty caches    │  │  Valid ranges    │   │
//! │  │ (BindFlags)  │  │  (CacheFlags)    │  │ (ValidRangeSet)  │   │
//! │  └──────────────┘  └──────────────────┘  └──────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bindings and dirty caches are set by the draw/state paths; the encoder
//! reads them to decide which caches to flush, and is the only writer of the
//! valid-range set.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod buffer;
pub mod cache;
pub mod range;
pub mod tracker;

// Re-exports
pub use buffer::BufferObject;
pub use cache::{BindFlags, CacheFlags};
pub use range::ValidRangeSet;
pub use tracker::{BufferTable, TrackerStats};
