//! Core value types: the [`Blob`] byte container and the canonical
//! [`TileCoord`] tile address.

mod blob;
mod tile_coord;

pub use blob::*;
pub use tile_coord::*;
