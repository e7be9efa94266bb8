//! The tagged geometry enum used throughout the pipeline.

use anyhow::{Result, bail};
use geo_types::{Coord, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use std::fmt::Debug;

/// A decoded tile-space geometry, in tile pixel coordinates.
#[derive(Clone, PartialEq)]
pub enum Geometry {
	Point(Point<f64>),
	LineString(LineString<f64>),
	Polygon(Polygon<f64>),
	MultiPoint(MultiPoint<f64>),
	MultiLineString(MultiLineString<f64>),
	MultiPolygon(MultiPolygon<f64>),
}

fn coord(value: [f64; 2]) -> Coord<f64> {
	Coord {
		x: value[0],
		y: value[1],
	}
}

fn line_string(value: Vec<[f64; 2]>) -> LineString<f64> {
	LineString::new(value.into_iter().map(coord).collect())
}

fn polygon(mut rings: Vec<Vec<[f64; 2]>>) -> Polygon<f64> {
	let exterior = line_string(rings.remove(0));
	let interiors = rings.into_iter().map(line_string).collect();
	Polygon::new(exterior, interiors)
}

impl Geometry {
	pub fn new_point(value: [f64; 2]) -> Self {
		Self::Point(Point::from(coord(value)))
	}

	pub fn new_line_string(value: Vec<[f64; 2]>) -> Self {
		Self::LineString(line_string(value))
	}

	/// First ring is the exterior, the rest are holes.
	pub fn new_polygon(value: Vec<Vec<[f64; 2]>>) -> Self {
		Self::Polygon(polygon(value))
	}

	pub fn new_multi_point(value: Vec<[f64; 2]>) -> Self {
		Self::MultiPoint(MultiPoint(value.into_iter().map(|c| Point::from(coord(c))).collect()))
	}

	pub fn new_multi_line_string(value: Vec<Vec<[f64; 2]>>) -> Self {
		Self::MultiLineString(MultiLineString(value.into_iter().map(line_string).collect()))
	}

	pub fn new_multi_polygon(value: Vec<Vec<Vec<[f64; 2]>>>) -> Self {
		Self::MultiPolygon(MultiPolygon(value.into_iter().map(polygon).collect()))
	}

	/// Promotes single geometries to their multi counterparts.
	pub fn into_multi(self) -> Self {
		match self {
			Geometry::Point(g) => Geometry::MultiPoint(MultiPoint(vec![g])),
			Geometry::LineString(g) => Geometry::MultiLineString(MultiLineString(vec![g])),
			Geometry::Polygon(g) => Geometry::MultiPolygon(MultiPolygon(vec![g])),
			other => other,
		}
	}

	/// All line strings of a line-typed geometry.
	pub fn into_line_strings(self) -> Result<Vec<LineString<f64>>> {
		match self {
			Geometry::LineString(g) => Ok(vec![g]),
			Geometry::MultiLineString(g) => Ok(g.0),
			other => bail!("expected a line geometry, got {other:?}"),
		}
	}

	/// All polygons of a polygon-typed geometry.
	pub fn into_polygons(self) -> Result<Vec<Polygon<f64>>> {
		match self {
			Geometry::Polygon(g) => Ok(vec![g]),
			Geometry::MultiPolygon(g) => Ok(g.0),
			other => bail!("expected a polygon geometry, got {other:?}"),
		}
	}
}

impl Debug for Geometry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let (type_name, inner): (&str, &dyn Debug) = match self {
			Geometry::Point(g) => ("Point", g),
			Geometry::LineString(g) => ("LineString", g),
			Geometry::Polygon(g) => ("Polygon", g),
			Geometry::MultiPoint(g) => ("MultiPoint", g),
			Geometry::MultiLineString(g) => ("MultiLineString", g),
			Geometry::MultiPolygon(g) => ("MultiPolygon", g),
		};
		f.debug_tuple(type_name).field(inner).finish()
	}
}
