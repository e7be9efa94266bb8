//! Morphological closing with mitre joins.
//!
//! `dilate` unions the input polygons with a boundary strip: one rectangle
//! per edge, thickened by the buffer distance on both sides, plus mitre
//! wedges at every vertex (falling back to a bevel past the mitre limit).
//! `erode` subtracts the same strip from the shape. Running one after the
//! other closes gaps of up to twice the buffer distance while keeping
//! corners square, which is what distinguishes this from a round-join
//! buffer.

use geo::{BooleanOps, unary_union};
use geo_types::{Coord, LineString, MultiPolygon, Polygon};

/// Corners sharper than `1 / MITRE_LIMIT` (as a half-angle cosine) get a
/// bevel instead of a mitre spike.
const MITRE_LIMIT: f64 = 5.0;

/// `dilate(+distance)` then `erode(-distance)`.
///
/// The erosion half only runs for a strictly positive distance; zero and
/// negative distances degrade to a plain union of the inputs.
pub fn morphological_close(polygons: &[Polygon<f64>], distance: f64) -> MultiPolygon<f64> {
	let dilated = dilate(polygons, distance);
	if distance > 0.0 {
		erode(&dilated, distance)
	} else {
		dilated
	}
}

/// Expands the union of `polygons` by `distance` with mitre joins.
pub fn dilate(polygons: &[Polygon<f64>], distance: f64) -> MultiPolygon<f64> {
	if polygons.is_empty() {
		return MultiPolygon(Vec::new());
	}
	if distance <= 0.0 {
		return unary_union(polygons);
	}
	let mut parts: Vec<Polygon<f64>> = polygons.to_vec();
	for polygon in polygons {
		for ring in rings_of(polygon) {
			parts.extend(boundary_strip(ring, distance));
		}
	}
	unary_union(&parts)
}

/// Shrinks `shape` by `distance` with mitre joins.
pub fn erode(shape: &MultiPolygon<f64>, distance: f64) -> MultiPolygon<f64> {
	if distance <= 0.0 || shape.0.is_empty() {
		return shape.clone();
	}
	let mut parts: Vec<Polygon<f64>> = Vec::new();
	for polygon in &shape.0 {
		for ring in rings_of(polygon) {
			parts.extend(boundary_strip(ring, distance));
		}
	}
	if parts.is_empty() {
		return shape.clone();
	}
	let strip = unary_union(&parts);
	shape.difference(&strip)
}

fn rings_of(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
	std::iter::once(polygon.exterior()).chain(polygon.interiors())
}

/// Covers every point within `distance` of the (closed) ring: per-edge
/// rectangles plus mitre wedges on both sides of every vertex.
fn boundary_strip(ring: &LineString<f64>, distance: f64) -> Vec<Polygon<f64>> {
	let mut parts = Vec::new();
	let points = &ring.0;
	if points.len() < 2 {
		return parts;
	}

	for segment in ring.lines() {
		let Some(normal) = unit_normal(segment.start, segment.end) else {
			continue;
		};
		let n = scale(normal, distance);
		parts.push(convex_quad(vec![
			add(segment.start, n),
			add(segment.end, n),
			sub(segment.end, n),
			sub(segment.start, n),
		]));
	}

	// the ring is closed, so points[len - 1] == points[0]
	let count = points.len() - 1;
	if count >= 3 {
		for i in 0..count {
			let prev = points[(i + count - 1) % count];
			let vertex = points[i];
			let next = points[i + 1];
			parts.extend(vertex_wedges(prev, vertex, next, distance));
		}
	}
	parts
}

/// Fills the join gap at `vertex` on both sides of the boundary.
fn vertex_wedges(prev: Coord<f64>, vertex: Coord<f64>, next: Coord<f64>, distance: f64) -> Vec<Polygon<f64>> {
	let (Some(n1), Some(n2)) = (unit_normal(prev, vertex), unit_normal(vertex, next)) else {
		return Vec::new();
	};

	let mut wedges = Vec::new();
	for side in [1.0f64, -1.0] {
		let a = add(vertex, scale(n1, distance * side));
		let b = add(vertex, scale(n2, distance * side));
		if close_enough(a, b) {
			continue;
		}

		let bisector = Coord {
			x: (n1.x + n2.x) * side,
			y: (n1.y + n2.y) * side,
		};
		let length = bisector.x.hypot(bisector.y);
		let cos_half = length / 2.0;

		if cos_half > 1.0 / MITRE_LIMIT {
			let mitre = add(vertex, scale(bisector, distance / (length * cos_half)));
			wedges.push(convex_quad(vec![vertex, a, mitre, b]));
		} else {
			// opposite normals: a spike past the mitre limit, bevel it
			wedges.push(convex_quad(vec![vertex, a, b]));
		}
	}
	wedges
}

/// Builds a polygon with counter-clockwise winding from a small convex hull
/// of points.
fn convex_quad(mut points: Vec<Coord<f64>>) -> Polygon<f64> {
	let doubled_area: f64 = {
		let mut sum = 0.0;
		for i in 0..points.len() {
			let a = points[i];
			let b = points[(i + 1) % points.len()];
			sum += (a.x - b.x) * (a.y + b.y);
		}
		sum
	};
	if doubled_area < 0.0 {
		points.reverse();
	}
	Polygon::new(LineString::new(points), Vec::new())
}

fn unit_normal(from: Coord<f64>, to: Coord<f64>) -> Option<Coord<f64>> {
	let dx = to.x - from.x;
	let dy = to.y - from.y;
	let length = dx.hypot(dy);
	if length == 0.0 {
		return None;
	}
	Some(Coord {
		x: -dy / length,
		y: dx / length,
	})
}

fn add(a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
	Coord {
		x: a.x + b.x,
		y: a.y + b.y,
	}
}

fn sub(a: Coord<f64>, b: Coord<f64>) -> Coord<f64> {
	Coord {
		x: a.x - b.x,
		y: a.y - b.y,
	}
}

fn scale(a: Coord<f64>, factor: f64) -> Coord<f64> {
	Coord {
		x: a.x * factor,
		y: a.y * factor,
	}
}

fn close_enough(a: Coord<f64>, b: Coord<f64>) -> bool {
	(a.x - b.x).abs() < 1e-12 && (a.y - b.y).abs() < 1e-12
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::math::area_ring;
	use geo_types::polygon;

	fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
		polygon![(x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1)]
	}

	fn total_area(mp: &MultiPolygon<f64>) -> f64 {
		mp.0.iter().map(|p| area_ring(&p.exterior().0).abs()).sum()
	}

	#[test]
	fn dilate_grows_a_square_with_square_corners() {
		let dilated = dilate(&[square(0.0, 0.0, 10.0, 10.0)], 2.0);
		// mitre joins keep the result a square: (10 + 2 + 2)^2
		assert!((total_area(&dilated) - 196.0).abs() < 1.0);
	}

	#[test]
	fn closing_merges_polygons_across_a_gap() {
		let closed = morphological_close(&[square(0.0, 0.0, 10.0, 10.0), square(12.0, 0.0, 22.0, 10.0)], 2.0);
		assert_eq!(closed.0.len(), 1);
		// both squares plus the closed 2x10 gap
		assert!((total_area(&closed) - 220.0).abs() < 1.0);
	}

	#[test]
	fn closing_leaves_distant_polygons_apart() {
		let closed = morphological_close(&[square(0.0, 0.0, 10.0, 10.0), square(20.0, 0.0, 30.0, 10.0)], 2.0);
		assert_eq!(closed.0.len(), 2);
	}

	#[test]
	fn zero_distance_degrades_to_union() {
		let closed = morphological_close(&[square(0.0, 0.0, 10.0, 10.0), square(5.0, 0.0, 15.0, 10.0)], 0.0);
		assert_eq!(closed.0.len(), 1);
		assert!((total_area(&closed) - 150.0).abs() < 1e-6);
	}

	#[test]
	fn erode_shrinks_back() {
		let eroded = erode(&MultiPolygon(vec![square(0.0, 0.0, 10.0, 10.0)]), 2.0);
		assert_eq!(eroded.0.len(), 1);
		assert!((total_area(&eroded) - 36.0).abs() < 1.0);
	}

	#[test]
	fn erode_swallows_tiny_polygons() {
		let eroded = erode(&MultiPolygon(vec![square(0.0, 0.0, 3.0, 3.0)]), 2.0);
		assert!(eroded.0.is_empty() || total_area(&eroded) < 1e-6);
	}
}
