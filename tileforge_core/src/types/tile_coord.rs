//! This module defines [`TileCoord`], a tile position `(z, x, y)` with a
//! canonical 32-bit encoding.
//!
//! The encoding is the per-zoom cumulative offset plus the Hilbert-curve
//! index of `(x, y)` within the zoom level, so that ascending numeric order
//! first walks all tiles of zoom 0, then zoom 1, and inside each zoom follows
//! the Hilbert curve — a cache-friendly traversal for downstream writers.
//! The mapping is a total bijection for zooms `0..=15`; the largest encoded
//! id is 1_431_655_764, well inside `u32`.
//!
//! # Examples
//!
//! ```
//! use tileforge_core::TileCoord;
//!
//! let coord = TileCoord::new(3, 5, 1).unwrap();
//! let id = coord.encoded();
//! assert_eq!(TileCoord::from_encoded(id).unwrap(), coord);
//! ```

use anyhow::{Result, bail, ensure};
use std::fmt::{self, Debug};

/// Highest zoom level representable in the 32-bit tile id.
pub const MAX_ZOOM: u8 = 15;

/// A tile position `(z, x, y)` in the standard tile pyramid.
#[derive(Eq, PartialEq, Clone, Copy, Hash)]
pub struct TileCoord {
	pub x: u32,
	pub y: u32,
	pub z: u8,
}

impl TileCoord {
	pub fn new(z: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(z <= MAX_ZOOM, "zoom ({z}) must be <= {MAX_ZOOM}");
		let max = 1u32 << z;
		ensure!(x < max, "x ({x}) must be < {max} at zoom {z}");
		ensure!(y < max, "y ({y}) must be < {max} at zoom {z}");
		Ok(TileCoord { x, y, z })
	}

	/// Encodes this coordinate into its canonical 32-bit tile id.
	#[must_use]
	pub fn encoded(&self) -> u32 {
		(zoom_offset(self.z) + hilbert_index(self.z, self.x, self.y)) as u32
	}

	/// Decodes a 32-bit tile id back into `(z, x, y)`.
	pub fn from_encoded(id: u32) -> Result<TileCoord> {
		let id = u64::from(id);
		for z in 0..=MAX_ZOOM {
			let offset = zoom_offset(z);
			let count = 1u64 << (2 * z);
			if id < offset + count {
				let (x, y) = hilbert_coord(z, id - offset);
				return Ok(TileCoord { x, y, z });
			}
		}
		bail!("tile id ({id}) exceeds zoom {MAX_ZOOM}");
	}
}

impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!("TileCoord({}, [{}, {}])", &self.z, &self.x, &self.y))
	}
}

impl PartialOrd for TileCoord {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for TileCoord {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.encoded().cmp(&other.encoded())
	}
}

/// Number of tiles in all zoom levels below `z`.
fn zoom_offset(z: u8) -> u64 {
	((1u64 << (2 * z)) - 1) / 3
}

fn hilbert_index(z: u8, x: u32, y: u32) -> u64 {
	let n = 1u64 << z;
	let mut tx = u64::from(x);
	let mut ty = u64::from(y);
	let mut d = 0u64;
	let mut s = n / 2;
	while s > 0 {
		let rx = u64::from(tx & s > 0);
		let ry = u64::from(ty & s > 0);
		d += s * s * ((3 * rx) ^ ry);
		rotate(s, &mut tx, &mut ty, rx, ry);
		s /= 2;
	}
	d
}

fn hilbert_coord(z: u8, index: u64) -> (u32, u32) {
	let n = 1u64 << z;
	let mut t = index;
	let mut tx = 0u64;
	let mut ty = 0u64;
	let mut s = 1u64;
	while s < n {
		let rx = (t / 2) & 1;
		let ry = (t ^ rx) & 1;
		rotate(s, &mut tx, &mut ty, rx, ry);
		tx += s * rx;
		ty += s * ry;
		t /= 4;
		s *= 2;
	}
	(tx as u32, ty as u32)
}

fn rotate(s: u64, tx: &mut u64, ty: &mut u64, rx: u64, ry: u64) {
	if ry == 0 {
		if rx == 1 {
			*tx = s - 1 - *tx;
			*ty = s - 1 - *ty;
		}
		std::mem::swap(tx, ty);
	}
}
