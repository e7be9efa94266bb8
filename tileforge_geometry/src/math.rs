//! Scalar geometry math shared by the simplifier and the mergers: signed
//! ring areas, point/segment distances and polygon distance tests.

use geo_types::{Coord, LineString, MultiPolygon, Polygon};

/// Signed area of a ring. Positive for counter-clockwise rings (in the
/// y-up sense); the codec uses the sign to tell exterior rings from holes.
pub fn area_ring(ring: &[Coord<f64>]) -> f64 {
	if ring.len() < 3 {
		return 0.0;
	}
	let mut sum = 0f64;
	let mut p2 = ring[ring.len() - 1];
	for p1 in ring {
		sum += (p2.x - p1.x) * (p1.y + p2.y);
		p2 = *p1;
	}
	sum / 2.0
}

/// Euclidean length of an open polyline.
pub fn line_length(points: &[Coord<f64>]) -> f64 {
	points
		.windows(2)
		.map(|w| (w[1].x - w[0].x).hypot(w[1].y - w[0].y))
		.sum()
}

/// Squared distance from `point` to the segment `a`–`b`, projection clamped
/// to the segment. Degenerate segments (a == b) fall back to point distance.
pub fn point_segment_distance_sq(point: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
	let abx = b.x - a.x;
	let aby = b.y - a.y;
	let apx = point.x - a.x;
	let apy = point.y - a.y;

	let ab_sq = abx * abx + aby * aby;
	if ab_sq == 0.0 {
		return apx * apx + apy * apy;
	}

	let t = ((apx * abx + apy * aby) / ab_sq).clamp(0.0, 1.0);
	let dx = point.x - (a.x + t * abx);
	let dy = point.y - (a.y + t * aby);
	dx * dx + dy * dy
}

fn orientation(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> f64 {
	(b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Proper or touching intersection of segments `a1`–`a2` and `b1`–`b2`.
pub fn segments_intersect(a1: Coord<f64>, a2: Coord<f64>, b1: Coord<f64>, b2: Coord<f64>) -> bool {
	let d1 = orientation(b1, b2, a1);
	let d2 = orientation(b1, b2, a2);
	let d3 = orientation(a1, a2, b1);
	let d4 = orientation(a1, a2, b2);

	if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0)) && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0)) {
		return true;
	}

	let on_segment = |p: Coord<f64>, q: Coord<f64>, r: Coord<f64>| {
		r.x >= p.x.min(q.x) && r.x <= p.x.max(q.x) && r.y >= p.y.min(q.y) && r.y <= p.y.max(q.y)
	};
	(d1 == 0.0 && on_segment(b1, b2, a1))
		|| (d2 == 0.0 && on_segment(b1, b2, a2))
		|| (d3 == 0.0 && on_segment(a1, a2, b1))
		|| (d4 == 0.0 && on_segment(a1, a2, b2))
}

/// Minimum distance between two segments; zero when they intersect.
pub fn segment_distance(a1: Coord<f64>, a2: Coord<f64>, b1: Coord<f64>, b2: Coord<f64>) -> f64 {
	if segments_intersect(a1, a2, b1, b2) {
		return 0.0;
	}
	point_segment_distance_sq(a1, b1, b2)
		.min(point_segment_distance_sq(a2, b1, b2))
		.min(point_segment_distance_sq(b1, a1, a2))
		.min(point_segment_distance_sq(b2, a1, a2))
		.sqrt()
}

/// Even-odd (ray casting) point-in-polygon test over all rings, so holes
/// count as outside.
pub fn polygon_contains_point(polygon: &Polygon<f64>, point: Coord<f64>) -> bool {
	let mut inside = false;
	for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
		for line in ring.lines() {
			let (a, b) = (line.start, line.end);
			if (a.y > point.y) != (b.y > point.y) {
				let x_cross = a.x + (b.x - a.x) * (point.y - a.y) / (b.y - a.y);
				if point.x < x_cross {
					inside = !inside;
				}
			}
		}
	}
	inside
}

fn multi_polygon_contains_point(mp: &MultiPolygon<f64>, point: Coord<f64>) -> bool {
	mp.0.iter().any(|polygon| polygon_contains_point(polygon, point))
}

fn rings(mp: &MultiPolygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
	mp.0
		.iter()
		.flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
}

/// Minimum distance between two multi-polygons: zero when one contains a
/// vertex of the other or their boundaries cross, otherwise the minimum over
/// all boundary segment pairs.
pub fn multi_polygon_distance(a: &MultiPolygon<f64>, b: &MultiPolygon<f64>) -> f64 {
	let first_a = rings(a).flat_map(|r| r.0.iter()).next();
	let first_b = rings(b).flat_map(|r| r.0.iter()).next();
	let (Some(&pa), Some(&pb)) = (first_a, first_b) else {
		return f64::INFINITY;
	};
	if multi_polygon_contains_point(a, pb) || multi_polygon_contains_point(b, pa) {
		return 0.0;
	}

	let mut best = f64::INFINITY;
	for ring_a in rings(a) {
		for seg_a in ring_a.lines() {
			for ring_b in rings(b) {
				for seg_b in ring_b.lines() {
					best = best.min(segment_distance(seg_a.start, seg_a.end, seg_b.start, seg_b.end));
					if best == 0.0 {
						return 0.0;
					}
				}
			}
		}
	}
	best
}
