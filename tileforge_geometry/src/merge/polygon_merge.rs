//! Proximity-based polygon union.
//!
//! Features whose geometries lie within `min_dist` of each other (and share
//! identical attributes) are connected into components through an R-tree,
//! each component is unified by morphological closing, and the results are
//! filtered by exterior-ring area.

use super::{closing::morphological_close, group_by_attrs};
use crate::geo::Geometry;
use crate::math::{area_ring, multi_polygon_distance};
use crate::vector_tile::{COORDINATE_SCALE, GeomType, VectorFeature};
use anyhow::Result;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use rstar::{AABB, RTree, RTreeObject};

/// An entry of the proximity index: a feature's envelope expanded by the
/// search distance, remembering which feature it belongs to.
struct IndexedEnvelope {
	min: [f64; 2],
	max: [f64; 2],
	index: usize,
}

impl RTreeObject for IndexedEnvelope {
	type Envelope = AABB<[f64; 2]>;

	fn envelope(&self) -> Self::Envelope {
		AABB::from_corners(self.min, self.max)
	}
}

/// Merges polygon features that sit within `min_dist` of each other.
///
/// Components of one feature are emitted unchanged; larger components are
/// unified by a mitre-join closing of `buffer` pixels. Either way the result
/// only survives when its exterior-ring area reaches `min_area`.
pub fn merge_nearby_polygons(
	features: Vec<VectorFeature>,
	min_area: f64,
	min_dist: f64,
	buffer: f64,
) -> Result<Vec<VectorFeature>> {
	let mut result = Vec::with_capacity(features.len());
	let groups = group_by_attrs(features, &mut result, GeomType::Polygon);

	for group in groups {
		let geometries = group
			.iter()
			.map(|feature| Ok(MultiPolygon(feature.decode_geometry()?.into_polygons()?)))
			.collect::<Result<Vec<_>>>()?;

		let adjacency = build_adjacency(&geometries, min_dist);

		let mut visited = vec![false; group.len()];
		for start in 0..group.len() {
			if visited[start] {
				continue;
			}
			// connected component, iterative so landcover with thousands of
			// members cannot overflow the stack
			let mut component = Vec::new();
			let mut stack = vec![start];
			visited[start] = true;
			while let Some(i) = stack.pop() {
				component.push(i);
				for &j in &adjacency[i] {
					if !visited[j] {
						visited[j] = true;
						stack.push(j);
					}
				}
			}
			component.sort_unstable();

			let first = &group[component[0]];
			if component.len() == 1 {
				if exterior_area(&geometries[component[0]]) >= min_area {
					result.push(first.clone());
				}
				continue;
			}

			let members: Vec<Polygon<f64>> = component
				.iter()
				.flat_map(|&i| geometries[i].0.iter().cloned())
				.collect();
			let closed = morphological_close(&members, buffer);
			let polygons: Vec<Polygon<f64>> = closed
				.0
				.into_iter()
				.filter(|polygon| area_ring(&polygon.exterior().0).abs() >= min_area)
				.filter_map(|polygon| snap_and_fix(&polygon))
				.collect();

			if polygons.is_empty() {
				continue;
			}
			let geometry = if polygons.len() == 1 {
				Geometry::Polygon(polygons.into_iter().next().unwrap())
			} else {
				Geometry::MultiPolygon(MultiPolygon(polygons))
			};
			result.push(VectorFeature::new(first.id, &geometry, first.attrs.clone())?);
		}
	}
	Ok(result)
}

/// Proximity edges between group members: an R-tree over envelopes expanded
/// by `min_dist` prunes the candidate pairs, exact distances decide.
fn build_adjacency(geometries: &[MultiPolygon<f64>], min_dist: f64) -> Vec<Vec<usize>> {
	let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); geometries.len()];
	if geometries.len() < 2 || min_dist < 0.0 {
		return adjacency;
	}

	let tree = RTree::bulk_load(
		geometries
			.iter()
			.enumerate()
			.filter_map(|(index, geometry)| {
				bounding_box(geometry).map(|(min, max)| IndexedEnvelope {
					min: [min[0] - min_dist, min[1] - min_dist],
					max: [max[0] + min_dist, max[1] + min_dist],
					index,
				})
			})
			.collect(),
	);

	for (i, geometry) in geometries.iter().enumerate() {
		let Some((min, max)) = bounding_box(geometry) else {
			continue;
		};
		for candidate in tree.locate_in_envelope_intersecting(&AABB::from_corners(min, max)) {
			let j = candidate.index;
			if j <= i {
				continue;
			}
			if multi_polygon_distance(geometry, &geometries[j]) <= min_dist {
				adjacency[i].push(j);
				adjacency[j].push(i);
			}
		}
	}
	adjacency
}

fn bounding_box(geometry: &MultiPolygon<f64>) -> Option<([f64; 2], [f64; 2])> {
	let mut bounds: Option<([f64; 2], [f64; 2])> = None;
	for polygon in &geometry.0 {
		for point in &polygon.exterior().0 {
			let (min, max) = bounds.get_or_insert(([point.x, point.y], [point.x, point.y]));
			min[0] = min[0].min(point.x);
			min[1] = min[1].min(point.y);
			max[0] = max[0].max(point.x);
			max[1] = max[1].max(point.y);
		}
	}
	bounds
}

fn exterior_area(geometry: &MultiPolygon<f64>) -> f64 {
	geometry
		.0
		.iter()
		.map(|polygon| area_ring(&polygon.exterior().0).abs())
		.sum()
}

/// Snaps coordinates to the codec's 1/16-pixel grid, drops rings that
/// degenerate, and restores ring orientation (exterior counter-clockwise,
/// holes clockwise). Returns `None` when the exterior itself collapses.
pub fn snap_and_fix(polygon: &Polygon<f64>) -> Option<Polygon<f64>> {
	let exterior = snap_ring(polygon.exterior())?;
	if area_ring(&exterior.0) < 0.0 {
		// re-orient instead of rejecting
		return snap_and_fix(&Polygon::new(
			LineString::new(exterior.0.into_iter().rev().collect()),
			polygon.interiors().to_vec(),
		));
	}

	let interiors = polygon
		.interiors()
		.iter()
		.filter_map(snap_ring)
		.map(|ring| {
			if area_ring(&ring.0) > 0.0 {
				LineString::new(ring.0.into_iter().rev().collect())
			} else {
				ring
			}
		})
		.collect();
	Some(Polygon::new(exterior, interiors))
}

fn snap_ring(ring: &LineString<f64>) -> Option<LineString<f64>> {
	let mut points: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
	for point in &ring.0 {
		let snapped = Coord {
			x: (point.x * COORDINATE_SCALE).round() / COORDINATE_SCALE,
			y: (point.y * COORDINATE_SCALE).round() / COORDINATE_SCALE,
		};
		if points.last() != Some(&snapped) {
			points.push(snapped);
		}
	}
	if points.first() != points.last() {
		let first = *points.first()?;
		points.push(first);
	}
	if points.len() < 4 || area_ring(&points).abs() < 1e-12 {
		return None;
	}
	Some(LineString::new(points))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::geo::{AttrValue, Attributes};

	fn square(id: i64, kind: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> VectorFeature {
		VectorFeature::new(
			id,
			&Geometry::new_polygon(vec![vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]),
			Attributes::from(vec![("kind", AttrValue::from(kind))]),
		)
		.unwrap()
	}

	fn areas(feature: &VectorFeature) -> f64 {
		let polygons = feature.decode_geometry().unwrap().into_polygons().unwrap();
		polygons.iter().map(|p| area_ring(&p.exterior().0).abs()).sum()
	}

	#[test]
	fn nearby_squares_merge_into_one() -> Result<()> {
		let features = vec![
			square(1, "wood", 0.0, 0.0, 10.0, 10.0),
			square(2, "wood", 12.0, 0.0, 22.0, 10.0),
		];
		let merged = merge_nearby_polygons(features, 10.0, 3.0, 2.0)?;
		assert_eq!(merged.len(), 1);
		// both squares plus the closed gap
		assert!(areas(&merged[0]) > 200.0);
		Ok(())
	}

	#[test]
	fn distant_squares_stay_separate() -> Result<()> {
		let features = vec![
			square(1, "wood", 0.0, 0.0, 10.0, 10.0),
			square(2, "wood", 12.0, 0.0, 22.0, 10.0),
		];
		let merged = merge_nearby_polygons(features, 10.0, 1.0, 2.0)?;
		assert_eq!(merged.len(), 2);
		Ok(())
	}

	#[test]
	fn different_attributes_never_merge() -> Result<()> {
		let features = vec![
			square(1, "wood", 0.0, 0.0, 10.0, 10.0),
			square(2, "water", 12.0, 0.0, 22.0, 10.0),
		];
		let merged = merge_nearby_polygons(features, 0.0, 3.0, 2.0)?;
		assert_eq!(merged.len(), 2);
		Ok(())
	}

	#[test]
	fn small_singles_are_dropped() -> Result<()> {
		let features = vec![
			square(1, "wood", 0.0, 0.0, 2.0, 2.0),
			square(2, "wood", 100.0, 100.0, 120.0, 120.0),
		];
		let merged = merge_nearby_polygons(features, 10.0, 1.0, 0.0)?;
		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].id, 2);
		Ok(())
	}

	#[test]
	fn chain_of_squares_forms_one_component() -> Result<()> {
		let features = vec![
			square(1, "wood", 0.0, 0.0, 10.0, 10.0),
			square(2, "wood", 11.0, 0.0, 21.0, 10.0),
			square(3, "wood", 22.0, 0.0, 32.0, 10.0),
		];
		// 1 and 3 are 12 apart, but both touch 2 within distance 2
		let merged = merge_nearby_polygons(features, 0.0, 2.0, 1.0)?;
		assert_eq!(merged.len(), 1);
		assert!(areas(&merged[0]) > 300.0);
		Ok(())
	}

	#[test]
	fn merged_feature_reuses_first_attrs() -> Result<()> {
		let features = vec![
			square(7, "wood", 0.0, 0.0, 10.0, 10.0),
			square(8, "wood", 11.0, 0.0, 21.0, 10.0),
		];
		let merged = merge_nearby_polygons(features, 0.0, 2.0, 1.0)?;
		assert_eq!(merged.len(), 1);
		assert_eq!(merged[0].id, 7);
		assert_eq!(
			merged[0].attrs.get("kind"),
			Some(&AttrValue::from("wood"))
		);
		Ok(())
	}

	#[test]
	fn points_pass_through_untouched() -> Result<()> {
		let point = VectorFeature::new(5, &Geometry::new_point([1.0, 1.0]), Attributes::new()).unwrap();
		let merged = merge_nearby_polygons(vec![point.clone()], 100.0, 1.0, 1.0)?;
		assert_eq!(merged, vec![point]);
		Ok(())
	}

	#[test]
	fn snap_and_fix_reorients_and_snaps() {
		let clockwise = Polygon::new(
			LineString::from(vec![(0.0, 0.0), (0.0, 10.0), (10.013, 10.0), (10.0, 0.0), (0.0, 0.0)]),
			vec![],
		);
		let fixed = snap_and_fix(&clockwise).unwrap();
		assert!(area_ring(&fixed.exterior().0) > 0.0);
		for point in &fixed.exterior().0 {
			assert_eq!(point.x, (point.x * 16.0).round() / 16.0);
		}
	}

	#[test]
	fn snap_and_fix_drops_collapsed_rings() {
		let sliver = Polygon::new(
			LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 0.001), (0.0, 0.0)]),
			vec![],
		);
		assert!(snap_and_fix(&sliver).is_none());
	}
}
