//! The sortable feature codec.
//!
//! One rendered feature becomes a `(u64 sort key, value bytes)` record. The
//! key alone expresses the total ordering — tile, layer, inverted z-order,
//! grouping bit — so the external sort never has to look at the value. The
//! value bytes are self-describing and bit-exact between encoder and
//! decoder; nothing else ever reads them.

use crate::string_encoder::CommonStringEncoder;
use anyhow::{Result, bail, ensure};
use std::sync::Arc;
use tileforge_core::io::{ValueReader, ValueReaderSlice, ValueWriter, ValueWriterBlob};
use tileforge_core::sort::SortEntry;
use tileforge_core::TileCoord;
use byteorder::LittleEndian;
use tileforge_geometry::geo::{AttrValue, Attributes};
use tileforge_geometry::vector_tile::{GeomType, VectorFeature, VectorGeometry};

/// Z-order bounds: 23 bits, stored inverted.
pub const Z_ORDER_MIN: i32 = -(1 << 22);
pub const Z_ORDER_MAX: i32 = (1 << 22) - 1;

const Z_ORDER_MASK: u64 = (1 << 23) - 1;

const TAG_STRING: u8 = 0;
const TAG_LONG: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_BOOL: u8 = 3;

/// Grouping of a feature: cluster id plus per-tile-layer cardinality cap
/// (0 = unlimited).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureGroupInfo {
	pub group: i64,
	pub limit: i32,
}

/// The parts of a rendered feature that end up in the value bytes. Producers
/// share one body between features (behind the `Arc`) when they emit the
/// same geometry into many tiles; the encoder exploits that identity.
#[derive(Debug, PartialEq)]
pub struct FeatureBody {
	pub id: i64,
	pub geometry: VectorGeometry,
	pub attrs: Attributes,
}

/// A feature rendered into one tile, ready for ingestion.
#[derive(Clone, Debug)]
pub struct RenderedFeature {
	pub tile: TileCoord,
	pub layer: String,
	pub z_order: i32,
	pub group: Option<FeatureGroupInfo>,
	pub body: Arc<FeatureBody>,
}

/// The unpacked 64-bit sort key:
///
/// ```text
/// [ 32 bits tile id ][ 8 bits layer id ][ 23 bits inverted z-order ][ 1 bit has_group ]
/// ```
///
/// Z-order is stored as `Z_ORDER_MAX - z` so ascending key order yields
/// descending z-order inside a tile and layer. The grouping bit sits last so
/// grouped and ungrouped features with equal z-order stay adjacent, grouped
/// ones second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
	pub tile_id: u32,
	pub layer_id: u8,
	pub z_order: i32,
	pub has_group: bool,
}

impl SortKey {
	pub fn pack(&self) -> u64 {
		let inverted = (Z_ORDER_MAX as i64 - self.z_order as i64) as u64 & Z_ORDER_MASK;
		(u64::from(self.tile_id) << 32)
			| (u64::from(self.layer_id) << 24)
			| (inverted << 1)
			| u64::from(self.has_group)
	}

	pub fn unpack(key: u64) -> SortKey {
		let inverted = (key >> 1) & Z_ORDER_MASK;
		SortKey {
			tile_id: (key >> 32) as u32,
			layer_id: ((key >> 24) & 0xFF) as u8,
			z_order: (Z_ORDER_MAX as i64 - inverted as i64) as i32,
			has_group: key & 1 == 1,
		}
	}

	/// Tile id portion of a packed key, without unpacking the rest.
	pub fn tile_id_of(key: u64) -> u32 {
		(key >> 32) as u32
	}

	/// Layer id portion of a packed key.
	pub fn layer_id_of(key: u64) -> u8 {
		((key >> 24) & 0xFF) as u8
	}
}

/// Encodes rendered features into sort entries.
///
/// Owns one growable scratch buffer that is reset between records, and
/// memoises the value bytes of the previous body: successive ungrouped
/// features sharing the same `Arc<FeatureBody>` reuse the bytes without
/// re-encoding. Filled ocean tiles hit that path constantly.
pub struct FeatureEncoder {
	layer_names: Arc<CommonStringEncoder>,
	attr_keys: Arc<CommonStringEncoder>,
	buffer: ValueWriterBlob<LittleEndian>,
	last: Option<(Arc<FeatureBody>, tileforge_core::Blob)>,
}

impl FeatureEncoder {
	pub fn new(layer_names: Arc<CommonStringEncoder>, attr_keys: Arc<CommonStringEncoder>) -> FeatureEncoder {
		FeatureEncoder {
			layer_names,
			attr_keys,
			buffer: ValueWriterBlob::new_le(),
			last: None,
		}
	}

	pub fn encode(&mut self, feature: &RenderedFeature) -> Result<SortEntry> {
		ensure!(
			(Z_ORDER_MIN..=Z_ORDER_MAX).contains(&feature.z_order),
			"z-order ({}) outside [{Z_ORDER_MIN}, {Z_ORDER_MAX}]",
			feature.z_order
		);

		let layer_id = self.layer_names.encode(&feature.layer)?;
		let key = SortKey {
			tile_id: feature.tile.encoded(),
			layer_id,
			z_order: feature.z_order,
			has_group: feature.group.is_some(),
		}
		.pack();

		if feature.group.is_none() {
			if let Some((body, value)) = &self.last {
				if Arc::ptr_eq(body, &feature.body) {
					return Ok(SortEntry::new(key, value.clone()));
				}
			}
		}

		self.buffer.reset();
		if let Some(group) = feature.group {
			self.buffer.write_svarint(group.group)?;
			self.buffer.write_svarint(i64::from(group.limit))?;
		}

		let body = &feature.body;
		self.buffer.write_svarint(body.id)?;
		self.buffer.write_u8(body.geometry.geom_type.as_u8())?;

		let attr_count = body
			.attrs
			.iter()
			.filter(|(_, value)| !matches!(value, AttrValue::Null))
			.count();
		self.buffer.write_varint(attr_count as u64)?;
		for (name, value) in body.attrs.iter() {
			// null values are dropped at encode time
			if matches!(value, AttrValue::Null) {
				continue;
			}
			self.buffer.write_u8(self.attr_keys.encode(name)?)?;
			match value {
				AttrValue::String(text) => {
					self.buffer.write_u8(TAG_STRING)?;
					self.buffer.write_string(text)?;
				}
				AttrValue::Int(number) => {
					self.buffer.write_u8(TAG_LONG)?;
					self.buffer.write_svarint(*number)?;
				}
				AttrValue::Double(number) => {
					self.buffer.write_u8(TAG_DOUBLE)?;
					self.buffer.write_f64(*number)?;
				}
				AttrValue::Bool(flag) => {
					self.buffer.write_u8(TAG_BOOL)?;
					self.buffer.write_u8(u8::from(*flag))?;
				}
				AttrValue::Null => unreachable!(),
			}
		}

		self.buffer.write_varint(body.geometry.commands.len() as u64)?;
		for command in &body.geometry.commands {
			self.buffer.write_varint(u64::from(*command))?;
		}

		let value = self.buffer.to_blob();
		if feature.group.is_none() {
			self.last = Some((Arc::clone(body), value.clone()));
		}
		Ok(SortEntry::new(key, value))
	}
}

/// A feature read back out of the sort.
#[derive(Clone, Debug, PartialEq)]
pub struct TileFeature {
	pub layer: String,
	pub group: Option<FeatureGroupInfo>,
	pub feature: VectorFeature,
}

/// Decodes sort entries back into typed features. The layer name always
/// comes from the key's layer-id byte, never from the value body.
#[derive(Clone)]
pub struct FeatureDecoder {
	layer_names: Arc<CommonStringEncoder>,
	attr_keys: Arc<CommonStringEncoder>,
}

impl FeatureDecoder {
	pub fn new(layer_names: Arc<CommonStringEncoder>, attr_keys: Arc<CommonStringEncoder>) -> FeatureDecoder {
		FeatureDecoder { layer_names, attr_keys }
	}

	/// Resolves a layer-id byte back to the layer name.
	pub fn layer_name(&self, id: u8) -> Result<String> {
		self.layer_names.decode(id)
	}

	/// Reads just the grouping preamble, without touching the body.
	pub fn peek_group(entry: &SortEntry) -> Result<Option<FeatureGroupInfo>> {
		if entry.key & 1 == 0 {
			return Ok(None);
		}
		let mut reader = ValueReaderSlice::new_le(entry.value.as_slice());
		Ok(Some(FeatureGroupInfo {
			group: reader.read_svarint()?,
			limit: reader.read_svarint()? as i32,
		}))
	}

	pub fn decode(&self, entry: &SortEntry) -> Result<TileFeature> {
		let key = SortKey::unpack(entry.key);
		let layer = self.layer_names.decode(key.layer_id)?;

		let mut reader = ValueReaderSlice::new_le(entry.value.as_slice());
		let group = if key.has_group {
			Some(FeatureGroupInfo {
				group: reader.read_svarint()?,
				limit: reader.read_svarint()? as i32,
			})
		} else {
			None
		};

		let id = reader.read_svarint()?;
		let geom_type = GeomType::from_u8(reader.read_u8()?)?;

		let attr_count = reader.read_varint()?;
		let mut attrs = Attributes::new();
		for _ in 0..attr_count {
			let name = self.attr_keys.decode(reader.read_u8()?)?;
			let value = match reader.read_u8()? {
				TAG_STRING => {
					let length = reader.read_varint()?;
					AttrValue::String(reader.read_string(length)?)
				}
				TAG_LONG => AttrValue::Int(reader.read_svarint()?),
				TAG_DOUBLE => AttrValue::Double(reader.read_f64()?),
				TAG_BOOL => AttrValue::Bool(reader.read_u8()? != 0),
				tag => bail!("unknown attribute value tag ({tag})"),
			};
			attrs.insert(name, value);
		}

		let command_count = reader.read_varint()?;
		let mut commands = Vec::with_capacity(command_count as usize);
		for _ in 0..command_count {
			commands.push(reader.read_varint()? as u32);
		}
		ensure!(!reader.has_remaining(), "trailing bytes after feature value");

		Ok(TileFeature {
			layer,
			group,
			feature: VectorFeature {
				id,
				geometry: VectorGeometry { geom_type, commands },
				attrs,
			},
		})
	}
}
