//! Byte-level plumbing for the tileforge feature pipeline.
//!
//! This crate contains the pieces that know nothing about geometry or map
//! semantics: the [`Blob`] byte container, binary value readers and writers
//! (varint/zigzag/fixed-width), the canonical 32-bit [`TileCoord`] encoding,
//! and the bounded-memory [`sort::ExternalMergeSort`] that the pipeline uses
//! to reorder billions of records by their 64-bit sort key.

pub mod io;
pub mod sort;
pub mod types;
pub use types::*;
pub mod utils;
pub use utils::*;
