//! Attribute-grouped line merging, re-simplification and window clipping.

use super::group_by_attrs;
use crate::geo::{Attributes, Geometry};
use crate::math::line_length;
use crate::simplify::simplify_coords;
use crate::vector_tile::{GeomType, VectorFeature};
use anyhow::Result;
use geo_types::Coord;
use log::warn;
use std::collections::HashMap;

/// Tile pixel extent the clip window is anchored to.
pub const DEFAULT_TILE_EXTENT: f64 = 256.0;

/// Merges connected line features that share identical attributes.
///
/// `min_length` drops merged lines shorter than that many pixels,
/// `tolerance` re-simplifies merged lines (negative disables), and
/// `clip > 0` clips the output to `[-clip, 256 + clip]²`.
pub fn merge_line_strings(
	features: Vec<VectorFeature>,
	min_length: f64,
	tolerance: f64,
	clip: f64,
) -> Result<Vec<VectorFeature>> {
	merge_line_strings_with(features, &|_| min_length, tolerance, clip, DEFAULT_TILE_EXTENT)
}

/// Like [`merge_line_strings`] but with a per-group length limit derived
/// from the group's attributes and an explicit tile extent.
pub fn merge_line_strings_with(
	features: Vec<VectorFeature>,
	length_limit: &dyn Fn(&Attributes) -> f64,
	tolerance: f64,
	clip: f64,
	extent: f64,
) -> Result<Vec<VectorFeature>> {
	let mut result = Vec::with_capacity(features.len());
	let groups = group_by_attrs(features, &mut result, GeomType::Line);

	for group in groups {
		let limit = length_limit(&group[0].attrs);

		// a lone feature with nothing to clip or filter stays as it is
		if group.len() == 1 && clip == 0.0 && limit == 0.0 {
			result.extend(group);
			continue;
		}

		let mut merger = LineMerger::default();
		for feature in &group {
			for line in feature.decode_geometry()?.into_line_strings()? {
				merger.add(line.0);
			}
		}

		let mut output: Vec<Vec<Coord<f64>>> = Vec::new();
		for line in merger.merge() {
			if limit > 0.0 && line_length(&line) < limit {
				continue;
			}
			let line = if tolerance >= 0.0 && line.len() > 2 {
				simplify_coords(&line, tolerance, 0)
			} else {
				line
			};
			if line.len() < 2 {
				warn!("merged line degenerated during simplification, skipping");
				continue;
			}
			if clip > 0.0 {
				output.extend(clip_line_to_window(&line, -clip, extent + clip));
			} else {
				output.push(line);
			}
		}

		if output.is_empty() {
			continue;
		}
		let lines: Vec<Vec<[f64; 2]>> = output
			.into_iter()
			.map(|line| line.into_iter().map(|c| [c.x, c.y]).collect())
			.collect();
		let geometry = if lines.len() == 1 {
			Geometry::new_line_string(lines.into_iter().next().unwrap())
		} else {
			Geometry::new_multi_line_string(lines)
		};
		let first = &group[0];
		result.push(VectorFeature::new(first.id, &geometry, first.attrs.clone())?);
	}
	Ok(result)
}

/// Joins line strings that meet end-to-end at nodes of degree exactly two
/// into maximal polylines. Lines meeting three or more other line ends stay
/// separate.
#[derive(Default)]
struct LineMerger {
	lines: Vec<Vec<Coord<f64>>>,
}

type EndpointKey = (u64, u64);

fn endpoint_key(c: &Coord<f64>) -> EndpointKey {
	(c.x.to_bits(), c.y.to_bits())
}

impl LineMerger {
	fn add(&mut self, line: Vec<Coord<f64>>) {
		if line.len() >= 2 {
			self.lines.push(line);
		}
	}

	fn merge(self) -> Vec<Vec<Coord<f64>>> {
		let lines = self.lines;
		let mut ends: HashMap<EndpointKey, Vec<(usize, bool)>> = HashMap::new();
		for (i, line) in lines.iter().enumerate() {
			ends.entry(endpoint_key(&line[0])).or_default().push((i, true));
			ends
				.entry(endpoint_key(line.last().unwrap()))
				.or_default()
				.push((i, false));
		}

		let mut used = vec![false; lines.len()];
		let mut result = Vec::new();

		for start in 0..lines.len() {
			if used[start] {
				continue;
			}
			used[start] = true;
			let mut chain = lines[start].clone();

			// grow at the tail, then flip and grow at the other end
			for _ in 0..2 {
				loop {
					let node = endpoint_key(chain.last().unwrap());
					let incident = &ends[&node];
					if incident.len() != 2 {
						break;
					}
					let Some(&(next, joins_at_start)) = incident.iter().find(|(j, _)| !used[*j]) else {
						break;
					};
					used[next] = true;
					let other = &lines[next];
					if joins_at_start {
						chain.extend(other[1..].iter().copied());
					} else {
						chain.extend(other[..other.len() - 1].iter().rev().copied());
					}
				}
				chain.reverse();
			}
			result.push(chain);
		}
		result
	}
}

/// Clips a polyline to the square window `[min, max]²`.
///
/// A segment is kept when its envelope intersects the window or the previous
/// segment's did (one-segment hysteresis); a run is only flushed after two
/// consecutive outside segments, so a short excursion survives as a tail
/// outside the window. The final endpoint is cut back to the window border
/// when its segment leaves the window for good.
fn clip_line_to_window(points: &[Coord<f64>], min: f64, max: f64) -> Vec<Vec<Coord<f64>>> {
	let mut result = Vec::new();
	let mut current: Vec<Coord<f64>> = Vec::new();
	let mut was_in = false;

	for window in points.windows(2) {
		let (p, q) = (window[0], window[1]);
		let now_in = segment_envelope_intersects(p, q, min, max);
		if now_in || was_in {
			current.push(p);
		} else if current.len() >= 2 {
			result.push(std::mem::take(&mut current));
		} else {
			current.clear();
		}
		was_in = now_in;
	}

	if was_in {
		let last = points[points.len() - 1];
		let prev = points[points.len() - 2];
		if outside_window(last, min, max) {
			match window_exit_point(prev, last, min, max) {
				Some(exit) => current.push(exit),
				None => current.push(last),
			}
		} else {
			current.push(last);
		}
	}
	if current.len() >= 2 {
		result.push(current);
	}
	result
}

fn segment_envelope_intersects(p: Coord<f64>, q: Coord<f64>, min: f64, max: f64) -> bool {
	p.x.min(q.x) <= max && p.x.max(q.x) >= min && p.y.min(q.y) <= max && p.y.max(q.y) >= min
}

fn outside_window(p: Coord<f64>, min: f64, max: f64) -> bool {
	p.x < min || p.x > max || p.y < min || p.y > max
}

/// Where the segment `p`→`q` (with `p` inside and `q` outside) crosses the
/// window border. `None` when `p` is already outside on the same side.
fn window_exit_point(p: Coord<f64>, q: Coord<f64>, min: f64, max: f64) -> Option<Coord<f64>> {
	let dx = q.x - p.x;
	let dy = q.y - p.y;
	let mut t = 1.0f64;
	let mut found = false;

	if q.x > max && p.x <= max && dx != 0.0 {
		t = t.min((max - p.x) / dx);
		found = true;
	}
	if q.x < min && p.x >= min && dx != 0.0 {
		t = t.min((min - p.x) / dx);
		found = true;
	}
	if q.y > max && p.y <= max && dy != 0.0 {
		t = t.min((max - p.y) / dy);
		found = true;
	}
	if q.y < min && p.y >= min && dy != 0.0 {
		t = t.min((min - p.y) / dy);
		found = true;
	}

	found.then(|| Coord {
		x: p.x + dx * t,
		y: p.y + dy * t,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::geo::{AttrValue, Attributes};
	use approx::assert_abs_diff_eq;

	fn c(x: f64, y: f64) -> Coord<f64> {
		Coord { x, y }
	}

	fn line(id: i64, kind: &str, points: Vec<[f64; 2]>) -> VectorFeature {
		VectorFeature::new(
			id,
			&Geometry::new_line_string(points),
			Attributes::from(vec![("kind", AttrValue::from(kind))]),
		)
		.unwrap()
	}

	#[test]
	fn two_collinear_lines_become_one() -> Result<()> {
		let features = vec![
			line(1, "road", vec![[0.0, 0.0], [1.0, 0.0]]),
			line(2, "road", vec![[1.0, 0.0], [2.0, 0.0]]),
		];
		let merged = merge_line_strings(features, 0.0, 0.0, 0.0)?;
		assert_eq!(merged.len(), 1);
		assert_eq!(
			merged[0].decode_geometry()?,
			Geometry::new_line_string(vec![[0.0, 0.0], [2.0, 0.0]])
		);
		Ok(())
	}

	#[test]
	fn different_attributes_stay_separate() -> Result<()> {
		let features = vec![
			line(1, "road", vec![[0.0, 0.0], [1.0, 0.0]]),
			line(2, "rail", vec![[1.0, 0.0], [2.0, 0.0]]),
		];
		let merged = merge_line_strings(features, 0.0, 0.0, 0.0)?;
		assert_eq!(merged.len(), 2);
		Ok(())
	}

	#[test]
	fn degree_three_nodes_are_not_joined() -> Result<()> {
		let features = vec![
			line(1, "road", vec![[0.0, 0.0], [1.0, 0.0]]),
			line(2, "road", vec![[1.0, 0.0], [2.0, 0.0]]),
			line(3, "road", vec![[1.0, 0.0], [1.0, 1.0]]),
		];
		let merged = merge_line_strings(features, 0.0, -1.0, 0.0)?;
		assert_eq!(merged.len(), 1);
		let lines = merged[0].decode_geometry()?.into_line_strings()?;
		assert_eq!(lines.len(), 3);
		Ok(())
	}

	#[test]
	fn short_lines_are_dropped() -> Result<()> {
		let features = vec![
			line(1, "road", vec![[0.0, 0.0], [1.0, 0.0]]),
			line(2, "road", vec![[50.0, 0.0], [80.0, 0.0]]),
		];
		let merged = merge_line_strings(features, 10.0, -1.0, 0.0)?;
		assert_eq!(merged.len(), 1);
		assert_eq!(
			merged[0].decode_geometry()?,
			Geometry::new_line_string(vec![[50.0, 0.0], [80.0, 0.0]])
		);
		Ok(())
	}

	#[test]
	fn single_feature_fast_path_is_untouched() -> Result<()> {
		// tolerance would simplify, but the fast path skips everything
		let features = vec![line(1, "road", vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]])];
		let merged = merge_line_strings(features.clone(), 0.0, 5.0, 0.0)?;
		assert_eq!(merged, features);
		Ok(())
	}

	#[test]
	fn merged_length_matches_inputs() -> Result<()> {
		let features = vec![
			line(1, "road", vec![[0.0, 0.0], [3.0, 0.0]]),
			line(2, "road", vec![[3.0, 0.0], [3.0, 4.0]]),
		];
		let merged = merge_line_strings(features, 0.0, -1.0, 0.0)?;
		let lines = merged[0].decode_geometry()?.into_line_strings()?;
		assert_eq!(lines.len(), 1);
		assert_abs_diff_eq!(line_length(&lines[0].0), 7.0, epsilon = 1e-9);
		Ok(())
	}

	#[test]
	fn clip_keeps_line_inside_window() {
		let points = [c(10.0, 10.0), c(20.0, 20.0)];
		let clipped = clip_line_to_window(&points, -4.0, 260.0);
		assert_eq!(clipped, vec![points.to_vec()]);
	}

	#[test]
	fn clip_cuts_final_segment_at_the_border() -> Result<()> {
		let features = vec![line(
			1,
			"road",
			vec![[-5.0, -5.0], [10.0, 10.0], [300.0, 300.0]],
		)];
		let merged = merge_line_strings(features, 0.0, -1.0, 4.0)?;
		assert_eq!(merged.len(), 1);
		assert_eq!(
			merged[0].decode_geometry()?,
			Geometry::new_line_string(vec![[-5.0, -5.0], [10.0, 10.0], [260.0, 260.0]])
		);
		Ok(())
	}

	#[test]
	fn clip_splits_around_long_outside_stretch() {
		let points = [
			c(0.0, 0.0),
			c(10.0, 0.0),
			c(1000.0, 0.0),
			c(1000.0, 10.0),
			c(1000.0, 20.0),
			c(10.0, 20.0),
			c(0.0, 20.0),
		];
		let clipped = clip_line_to_window(&points, -4.0, 260.0);
		assert_eq!(clipped.len(), 2);
		// first run carries a short tail beyond the window
		assert_eq!(clipped[0].first(), Some(&c(0.0, 0.0)));
		assert_eq!(clipped[1].last(), Some(&c(0.0, 20.0)));
	}

	#[test]
	fn fully_outside_line_disappears() {
		let points = [c(500.0, 500.0), c(600.0, 600.0), c(700.0, 700.0)];
		assert!(clip_line_to_window(&points, -4.0, 260.0).is_empty());
	}
}
