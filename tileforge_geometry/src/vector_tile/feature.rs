use super::GeomType;
use crate::geo::{Attributes, Geometry};
use crate::math::area_ring;
use anyhow::{Result, bail, ensure};
use geo_types::{Coord, LineString};
use log::trace;

// https://github.com/mapbox/vector-tile-spec/blob/master/2.1/README.md#43-geometry-encoding
const MOVE_TO: u32 = 1;
const LINE_TO: u32 = 2;
const CLOSE_PATH: u32 = 7;

/// Tile pixel coordinates are stored at 1/16-pixel resolution, matching a
/// 4096 extent over a 256-pixel tile.
pub const COORDINATE_SCALE: f64 = 16.0;

/// Geometry in the command-integer wire format.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VectorGeometry {
	pub geom_type: GeomType,
	pub commands: Vec<u32>,
}

/// A feature in tile space: numeric id, encoded geometry, typed attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorFeature {
	pub id: i64,
	pub geometry: VectorGeometry,
	pub attrs: Attributes,
}

impl VectorFeature {
	pub fn new(id: i64, geometry: &Geometry, attrs: Attributes) -> Result<VectorFeature> {
		Ok(VectorFeature {
			id,
			geometry: VectorGeometry::from_geometry(geometry)?,
			attrs,
		})
	}

	pub fn decode_geometry(&self) -> Result<Geometry> {
		self.geometry.decode()
	}
}

fn zigzag_encode(value: i64) -> u32 {
	((value << 1) ^ (value >> 63)) as u32
}

fn zigzag_decode(value: u32) -> i64 {
	i64::from(value >> 1) ^ -i64::from(value & 1)
}

struct CommandWriter {
	commands: Vec<u32>,
	prev: (i64, i64),
}

impl CommandWriter {
	fn new() -> CommandWriter {
		CommandWriter {
			commands: Vec::new(),
			prev: (0, 0),
		}
	}

	fn command(&mut self, id: u32, count: usize) {
		self.commands.push((count as u32) << 3 | id);
	}

	fn point(&mut self, point: Coord<f64>) {
		let x = (point.x * COORDINATE_SCALE).round() as i64;
		let y = (point.y * COORDINATE_SCALE).round() as i64;
		self.commands.push(zigzag_encode(x - self.prev.0));
		self.commands.push(zigzag_encode(y - self.prev.1));
		self.prev = (x, y);
	}
}

impl VectorGeometry {
	/// Encodes a decoded geometry back into command integers.
	pub fn from_geometry(geometry: &Geometry) -> Result<VectorGeometry> {
		let mut writer = CommandWriter::new();
		let geom_type = match geometry {
			Geometry::Point(g) => {
				writer.command(MOVE_TO, 1);
				writer.point(g.0);
				GeomType::Point
			}
			Geometry::MultiPoint(g) => {
				ensure!(!g.0.is_empty(), "multi-points must not be empty");
				writer.command(MOVE_TO, g.0.len());
				for point in &g.0 {
					writer.point(point.0);
				}
				GeomType::Point
			}
			Geometry::LineString(g) => {
				write_line(&mut writer, g)?;
				GeomType::Line
			}
			Geometry::MultiLineString(g) => {
				ensure!(!g.0.is_empty(), "multi-line-strings must not be empty");
				for line in &g.0 {
					write_line(&mut writer, line)?;
				}
				GeomType::Line
			}
			Geometry::Polygon(g) => {
				write_ring(&mut writer, g.exterior(), true)?;
				for interior in g.interiors() {
					write_ring(&mut writer, interior, false)?;
				}
				GeomType::Polygon
			}
			Geometry::MultiPolygon(g) => {
				ensure!(!g.0.is_empty(), "multi-polygons must not be empty");
				for polygon in &g.0 {
					write_ring(&mut writer, polygon.exterior(), true)?;
					for interior in polygon.interiors() {
						write_ring(&mut writer, interior, false)?;
					}
				}
				GeomType::Polygon
			}
		};
		Ok(VectorGeometry {
			geom_type,
			commands: writer.commands,
		})
	}

	/// Decodes the command integers back into coordinates.
	pub fn decode(&self) -> Result<Geometry> {
		let mut lines: Vec<Vec<Coord<f64>>> = Vec::new();
		let mut line: Vec<Coord<f64>> = Vec::new();
		let mut x = 0i64;
		let mut y = 0i64;

		let mut cursor = self.commands.iter().copied();
		while let Some(value) = cursor.next() {
			let command = value & 0x7;
			let count = value >> 3;
			match command {
				MOVE_TO | LINE_TO => {
					for _ in 0..count {
						if command == MOVE_TO && !line.is_empty() {
							// MoveTo starts a new line string
							lines.push(std::mem::take(&mut line));
						}
						let (Some(dx), Some(dy)) = (cursor.next(), cursor.next()) else {
							bail!("geometry commands are truncated");
						};
						x += zigzag_decode(dx);
						y += zigzag_decode(dy);
						line.push(Coord {
							x: x as f64 / COORDINATE_SCALE,
							y: y as f64 / COORDINATE_SCALE,
						});
					}
				}
				CLOSE_PATH => {
					ensure!(!line.is_empty(), "ClosePath on an empty ring");
					line.push(line[0]);
				}
				_ => bail!("unknown geometry command ({command})"),
			}
		}
		if !line.is_empty() {
			lines.push(line);
		}

		match self.geom_type {
			GeomType::Unknown => bail!("unknown geometry type"),

			GeomType::Point => {
				ensure!(!lines.is_empty(), "points must not be empty");
				let mut points = Vec::with_capacity(lines.len());
				for mut line in lines {
					ensure!(line.len() == 1, "point entries must have exactly one coordinate");
					let c = line.pop().unwrap();
					points.push([c.x, c.y]);
				}
				Ok(if points.len() == 1 {
					Geometry::new_point(points[0])
				} else {
					Geometry::new_multi_point(points)
				})
			}

			GeomType::Line => {
				ensure!(!lines.is_empty(), "line strings must not be empty");
				for line in &lines {
					ensure!(line.len() >= 2, "each line string needs at least two points");
				}
				let mut lines: Vec<Vec<[f64; 2]>> = lines
					.into_iter()
					.map(|line| line.into_iter().map(|c| [c.x, c.y]).collect())
					.collect();
				Ok(if lines.len() == 1 {
					Geometry::new_line_string(lines.pop().unwrap())
				} else {
					Geometry::new_multi_line_string(lines)
				})
			}

			GeomType::Polygon => {
				ensure!(!lines.is_empty(), "polygons must not be empty");
				let mut polygons: Vec<Vec<Vec<[f64; 2]>>> = Vec::new();
				let mut current: Vec<Vec<[f64; 2]>> = Vec::new();

				for ring in lines {
					ensure!(ring.len() >= 4, "each ring needs at least four points (A,B,C,A)");
					ensure!(ring[0] == ring[ring.len() - 1], "rings must be closed");

					let area = area_ring(&ring);
					let ring: Vec<[f64; 2]> = ring.into_iter().map(|c| [c.x, c.y]).collect();
					if area > 1e-14 {
						// outer ring
						if !current.is_empty() {
							polygons.push(std::mem::take(&mut current));
						}
						current.push(ring);
					} else if area < -1e-14 {
						// inner ring
						if current.is_empty() {
							trace!("an outer ring must precede inner rings");
						} else {
							current.push(ring);
						}
					} else {
						trace!("ring with zero area");
					}
				}
				if !current.is_empty() {
					polygons.push(current);
				}
				ensure!(!polygons.is_empty(), "polygon decoded to no usable rings");

				Ok(if polygons.len() == 1 {
					Geometry::new_polygon(polygons.pop().unwrap())
				} else {
					Geometry::new_multi_polygon(polygons)
				})
			}
		}
	}
}

fn write_line(writer: &mut CommandWriter, line: &LineString<f64>) -> Result<()> {
	ensure!(line.0.len() >= 2, "line strings need at least two points");
	writer.command(MOVE_TO, 1);
	writer.point(line.0[0]);
	writer.command(LINE_TO, line.0.len() - 1);
	for point in &line.0[1..] {
		writer.point(*point);
	}
	Ok(())
}

/// Writes one polygon ring. Exterior rings are emitted counter-clockwise
/// (positive signed area), holes clockwise; the decoder relies on the sign
/// to group rings back into polygons.
fn write_ring(writer: &mut CommandWriter, ring: &LineString<f64>, exterior: bool) -> Result<()> {
	let mut points: Vec<Coord<f64>> = ring.0.clone();
	if points.first() == points.last() {
		points.pop();
	}
	ensure!(points.len() >= 3, "polygon rings need at least three distinct points");

	let mut closed = points.clone();
	closed.push(closed[0]);
	let area = area_ring(&closed);
	if (exterior && area < 0.0) || (!exterior && area > 0.0) {
		points.reverse();
	}

	writer.command(MOVE_TO, 1);
	writer.point(points[0]);
	writer.command(LINE_TO, points.len() - 1);
	for point in &points[1..] {
		writer.point(*point);
	}
	writer.command(CLOSE_PATH, 1);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn round_trip(geometry: Geometry) -> Result<()> {
		let encoded = VectorGeometry::from_geometry(&geometry)?;
		assert_eq!(geometry, encoded.decode()?);
		Ok(())
	}

	#[test]
	fn point_round_trip() -> Result<()> {
		round_trip(Geometry::new_point([1.0, 2.0]))
	}

	#[test]
	fn multi_point_round_trip() -> Result<()> {
		round_trip(Geometry::new_multi_point(vec![[2.0, 3.0], [4.0, 5.0]]))
	}

	#[test]
	fn line_string_round_trip() -> Result<()> {
		round_trip(Geometry::new_line_string(vec![[0.0, 1.0], [0.0, 3.0]]))
	}

	#[test]
	fn multi_line_string_round_trip() -> Result<()> {
		round_trip(Geometry::new_multi_line_string(vec![
			vec![[0.0, 0.0], [1.0, 1.0], [2.0, 0.0]],
			vec![[0.0, 2.0], [1.0, 1.0], [2.0, 2.0]],
		]))
	}

	#[test]
	fn polygon_round_trip() -> Result<()> {
		round_trip(Geometry::new_polygon(vec![
			vec![[0.0, 0.0], [3.0, 0.0], [3.0, 3.0], [0.0, 3.0], [0.0, 0.0]],
			vec![[1.0, 1.0], [1.0, 2.0], [2.0, 2.0], [1.0, 1.0]],
		]))
	}

	#[test]
	fn multi_polygon_round_trip() -> Result<()> {
		round_trip(Geometry::new_multi_polygon(vec![
			vec![
				vec![[0.0, 0.0], [3.0, 0.0], [3.0, 3.0], [0.0, 3.0], [0.0, 0.0]],
				vec![[1.0, 1.0], [1.0, 2.0], [2.0, 2.0], [1.0, 1.0]],
			],
			vec![vec![[4.0, 0.0], [7.0, 0.0], [7.0, 3.0], [4.0, 3.0], [4.0, 0.0]]],
		]))
	}

	#[test]
	fn sub_pixel_precision_is_preserved() -> Result<()> {
		// 1/16 of a pixel survives the integer encoding
		round_trip(Geometry::new_line_string(vec![[0.0625, 0.5], [10.9375, 200.25]]))
	}

	#[test]
	fn coordinates_snap_to_the_grid() -> Result<()> {
		let encoded = VectorGeometry::from_geometry(&Geometry::new_point([0.01, 0.99]))?;
		let Geometry::Point(point) = encoded.decode()? else {
			panic!("expected a point");
		};
		assert_eq!(point.0.x, 0.0);
		assert_eq!(point.0.y, 1.0);
		Ok(())
	}

	#[test]
	fn misoriented_polygon_is_fixed_on_encode() -> Result<()> {
		// exterior given clockwise; decode returns it counter-clockwise
		let clockwise = Geometry::new_polygon(vec![vec![
			[0.0, 0.0],
			[0.0, 3.0],
			[3.0, 3.0],
			[3.0, 0.0],
			[0.0, 0.0],
		]]);
		let decoded = VectorGeometry::from_geometry(&clockwise)?.decode()?;
		let expected = Geometry::new_polygon(vec![vec![
			[0.0, 0.0],
			[3.0, 0.0],
			[3.0, 3.0],
			[0.0, 3.0],
			[0.0, 0.0],
		]]);
		assert_eq!(decoded, expected);
		Ok(())
	}

	#[test]
	fn truncated_commands_fail() {
		let geometry = VectorGeometry {
			geom_type: GeomType::Line,
			commands: vec![(1 << 3) | MOVE_TO, 2],
		};
		assert!(geometry.decode().is_err());
	}
}
