use anyhow::{Result, bail};

/// The wire-level geometry kind of a feature.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum GeomType {
	#[default]
	Unknown = 0,
	Point = 1,
	Line = 2,
	Polygon = 3,
}

impl GeomType {
	pub fn as_u8(self) -> u8 {
		self as u8
	}

	pub fn from_u8(value: u8) -> Result<GeomType> {
		Ok(match value {
			0 => GeomType::Unknown,
			1 => GeomType::Point,
			2 => GeomType::Line,
			3 => GeomType::Polygon,
			_ => bail!("invalid geometry type ({value})"),
		})
	}
}
