//! Per-tile geometric post-processing: attribute-grouped line merging with
//! window clipping, and proximity-based polygon union.

mod closing;
mod line_merge;
mod polygon_merge;

pub use closing::*;
pub use line_merge::*;
pub use polygon_merge::*;

use crate::vector_tile::{GeomType, VectorFeature};
use std::collections::HashMap;

/// Splits `features` into attribute-equivalence groups of the wanted
/// geometry type. Features of any other type are moved to `passthrough`
/// unchanged. Both the groups and the members inside each group keep their
/// input order; grouping is by the canonical attribute byte key.
pub(crate) fn group_by_attrs(
	features: Vec<VectorFeature>,
	passthrough: &mut Vec<VectorFeature>,
	geom_type: GeomType,
) -> Vec<Vec<VectorFeature>> {
	let mut order: HashMap<Vec<u8>, usize> = HashMap::new();
	let mut groups: Vec<Vec<VectorFeature>> = Vec::new();

	for feature in features {
		if feature.geometry.geom_type != geom_type {
			passthrough.push(feature);
			continue;
		}
		let key = feature.attrs.canonical_bytes();
		let index = *order.entry(key).or_insert_with(|| {
			groups.push(Vec::new());
			groups.len() - 1
		});
		groups[index].push(feature);
	}
	groups
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::geo::{AttrValue, Attributes, Geometry};

	fn line_feature(id: i64, kind: &str) -> VectorFeature {
		VectorFeature::new(
			id,
			&Geometry::new_line_string(vec![[0.0, 0.0], [1.0, 0.0]]),
			Attributes::from(vec![("kind", AttrValue::from(kind))]),
		)
		.unwrap()
	}

	fn point_feature(id: i64) -> VectorFeature {
		VectorFeature::new(id, &Geometry::new_point([0.0, 0.0]), Attributes::new()).unwrap()
	}

	#[test]
	fn groups_preserve_first_appearance_order() {
		let features = vec![
			line_feature(1, "river"),
			line_feature(2, "path"),
			line_feature(3, "river"),
		];
		let mut passthrough = Vec::new();
		let groups = group_by_attrs(features, &mut passthrough, GeomType::Line);
		assert!(passthrough.is_empty());
		assert_eq!(groups.len(), 2);
		assert_eq!(groups[0].iter().map(|f| f.id).collect::<Vec<_>>(), vec![1, 3]);
		assert_eq!(groups[1][0].id, 2);
	}

	#[test]
	fn other_types_pass_through() {
		let features = vec![point_feature(9), line_feature(1, "river")];
		let mut passthrough = Vec::new();
		let groups = group_by_attrs(features, &mut passthrough, GeomType::Line);
		assert_eq!(passthrough.len(), 1);
		assert_eq!(passthrough[0].id, 9);
		assert_eq!(groups.len(), 1);
	}
}
