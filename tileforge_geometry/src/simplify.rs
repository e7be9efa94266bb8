//! Douglas–Peucker simplification with forced interior points.
//!
//! The recursion is anchored: the farthest interior point from the current
//! anchor segment is kept when it lies beyond the tolerance, and the two
//! halves are processed independently. `num_forced_points` keeps at least
//! that many interior points even when every candidate is below tolerance —
//! polygon rings pass 2 so they can never collapse, open lines pass 0.
//!
//! The traversal uses an explicit work stack: fully connected landcover can
//! produce rings with tens of thousands of vertices and a call stack is the
//! wrong place for that.

use crate::math::point_segment_distance_sq;
use geo_types::Coord;

/// Simplifies `points` in tolerance `tolerance`, keeping endpoints and at
/// least `num_forced_points` interior points.
pub fn simplify_coords(points: &[Coord<f64>], tolerance: f64, num_forced_points: usize) -> Vec<Coord<f64>> {
	if points.len() <= 2 {
		return points.to_vec();
	}
	let tolerance_sq = tolerance * tolerance;

	let mut keep = vec![false; points.len()];
	keep[0] = true;
	keep[points.len() - 1] = true;

	let mut stack: Vec<(usize, usize, i64)> = Vec::with_capacity(64);
	stack.push((0, points.len() - 1, num_forced_points as i64));

	while let Some((lo, hi, forced)) = stack.pop() {
		if hi <= lo + 1 {
			continue;
		}

		let mut best = lo + 1;
		let mut best_distance_sq = -1.0f64;
		for i in lo + 1..hi {
			let distance_sq = point_segment_distance_sq(points[i], points[lo], points[hi]);
			if distance_sq > best_distance_sq {
				best_distance_sq = distance_sq;
				best = i;
			}
		}

		if best_distance_sq > tolerance_sq || forced > 0 {
			keep[best] = true;
			stack.push((lo, best, forced - 1));
			stack.push((best, hi, forced - 2));
		}
	}

	points
		.iter()
		.zip(keep)
		.filter_map(|(point, kept)| kept.then_some(*point))
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::math::line_length;

	fn c(x: f64, y: f64) -> Coord<f64> {
		Coord { x, y }
	}

	#[test]
	fn collinear_points_are_removed_at_zero_tolerance() {
		let line = [c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)];
		assert_eq!(simplify_coords(&line, 0.0, 0), vec![c(0.0, 0.0), c(2.0, 0.0)]);
	}

	#[test]
	fn endpoints_are_preserved_exactly() {
		let line = [c(0.125, 0.25), c(1.0, 0.01), c(2.0, -0.01), c(3.875, 0.75)];
		let simplified = simplify_coords(&line, 10.0, 0);
		assert_eq!(simplified.first(), Some(&c(0.125, 0.25)));
		assert_eq!(simplified.last(), Some(&c(3.875, 0.75)));
	}

	#[test]
	fn detail_above_tolerance_survives() {
		let line = [c(0.0, 0.0), c(5.0, 4.0), c(10.0, 0.0)];
		assert_eq!(simplify_coords(&line, 1.0, 0).len(), 3);
		assert_eq!(simplify_coords(&line, 5.0, 0).len(), 2);
	}

	#[test]
	fn no_removed_vertex_was_farther_than_tolerance() {
		// zigzag with small noise
		let line: Vec<Coord<f64>> = (0..50)
			.map(|i| c(f64::from(i), if i % 2 == 0 { 0.0 } else { 0.4 }))
			.collect();
		let tolerance = 0.5;
		let simplified = simplify_coords(&line, tolerance, 0);
		assert!(simplified.len() < line.len());
		for point in &line {
			let min_distance_sq = simplified
				.windows(2)
				.map(|w| point_segment_distance_sq(*point, w[0], w[1]))
				.fold(f64::INFINITY, f64::min);
			assert!(min_distance_sq.sqrt() <= tolerance + 1e-9);
		}
	}

	#[test]
	fn output_is_never_longer() {
		let line: Vec<Coord<f64>> = (0..30).map(|i| c(f64::from(i), f64::from(i % 5))).collect();
		let simplified = simplify_coords(&line, 2.0, 0);
		assert!(line_length(&simplified) <= line_length(&line) + 1e-9);
	}

	#[test]
	fn forced_points_prevent_ring_collapse() {
		// a closed square ring far below tolerance
		let ring = [c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
		let simplified = simplify_coords(&ring, 100.0, 2);
		assert!(simplified.len() >= 4);
		assert_eq!(simplified.first(), simplified.last());
	}

	#[test]
	fn forced_points_pick_the_farthest() {
		let line = [c(0.0, 0.0), c(1.0, 0.1), c(2.0, 0.5), c(3.0, 0.1), c(4.0, 0.0)];
		let simplified = simplify_coords(&line, 100.0, 1);
		assert!(simplified.contains(&c(2.0, 0.5)));
		assert_eq!(simplified.len(), 3);
	}

	#[test]
	fn short_inputs_pass_through() {
		let line = [c(0.0, 0.0), c(1.0, 1.0)];
		assert_eq!(simplify_coords(&line, 0.0, 0), line.to_vec());
	}
}
