//! Tile-space features with MVT-style encoded geometry.
//!
//! Geometry travels through the sort as a flat array of command integers in
//! the format the downstream vector-tile encoder expects (MoveTo/LineTo/
//! ClosePath with zigzag-encoded deltas at 1/16-pixel precision), so the
//! post-processors decode it only when they actually touch coordinates.

mod feature;
mod geometry_type;

pub use feature::*;
pub use geometry_type::*;
