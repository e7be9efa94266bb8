//! Streaming group-by-tile on top of the external sort.
//!
//! `FeatureGroup` accepts rendered features from a single producer, encodes
//! them and forwards them to the sorter. After `prepare()` the group can be
//! iterated exactly once, yielding one [`TileFeatures`] per distinct tile id
//! in ascending encoded order. Group cardinality caps are enforced here, at
//! tile assembly, not at sort time.

use crate::config::PipelineConfig;
use crate::feature::{FeatureDecoder, FeatureEncoder, RenderedFeature, SortKey};
use crate::profile::{PostProcessError, Profile, Stats};
use crate::string_encoder::CommonStringEncoder;
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::warn;
use std::collections::HashMap;
use std::iter::Peekable;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tileforge_core::sort::{ExternalMergeSort, SortEntry, SortedStream};
use tileforge_core::{CancellationToken, TileCoord};
use tileforge_geometry::vector_tile::VectorFeature;

/// Stable code reported through `Stats::data_error` when a layer
/// post-processor fails recoverably.
pub const POST_PROCESS_ERROR: &str = "post_process_error";

/// Buffers features for all tiles, sorted by the 64-bit key.
pub struct FeatureGroup {
	sorter: ExternalMergeSort,
	encoder: FeatureEncoder,
	decoder: FeatureDecoder,
	profile: Arc<dyn Profile>,
	stats: Arc<dyn Stats>,
	cancel: CancellationToken,
	prepared: AtomicBool,
}

impl FeatureGroup {
	pub fn new(
		config: &PipelineConfig,
		profile: Arc<dyn Profile>,
		stats: Arc<dyn Stats>,
		cancel: CancellationToken,
	) -> Result<FeatureGroup> {
		let layer_names = Arc::new(CommonStringEncoder::new("layer names"));
		let attr_keys = Arc::new(CommonStringEncoder::new("attribute keys"));
		let sorter = ExternalMergeSort::new(
			&config.temp_dir,
			config.chunk_memory_budget_bytes,
			config.sort_parallelism,
			cancel.clone(),
		)?;
		Ok(FeatureGroup {
			sorter,
			encoder: FeatureEncoder::new(layer_names.clone(), attr_keys.clone()),
			decoder: FeatureDecoder::new(layer_names, attr_keys),
			profile,
			stats,
			cancel,
			prepared: AtomicBool::new(false),
		})
	}

	/// Encodes and buffers one rendered feature.
	pub fn accept(&mut self, feature: &RenderedFeature) -> Result<()> {
		ensure!(
			!self.prepared.load(Ordering::Acquire),
			"features cannot be accepted after prepare()"
		);
		let entry = self.encoder.encode(feature)?;
		self.sorter.add(entry)
	}

	/// Finishes ingestion and sorts. Idempotent, first caller wins; the
	/// release store pairs with the acquire load in `tiles()` so a later
	/// consumer observes the sorted state.
	pub fn prepare(&mut self) -> Result<()> {
		if self.prepared.load(Ordering::Acquire) {
			return Ok(());
		}
		self.stats.stage("sort");
		self.sorter.sort()?;
		self.prepared.store(true, Ordering::Release);
		Ok(())
	}

	/// Opens the one-shot tile iterator.
	pub fn tiles(&mut self) -> Result<TileIter> {
		ensure!(
			self.prepared.load(Ordering::Acquire),
			"prepare() must run before iterating tiles"
		);
		Ok(TileIter {
			stream: self.sorter.iter()?.peekable(),
			decoder: self.decoder.clone(),
			profile: self.profile.clone(),
			stats: self.stats.clone(),
			cancel: self.cancel.clone(),
		})
	}

	pub fn num_features_written(&self) -> u64 {
		self.sorter.num_entries_written()
	}

	pub fn disk_usage_bytes(&self) -> u64 {
		self.sorter.disk_usage_bytes()
	}
}

/// One layer of one tile after post-processing, bottom-most feature first.
#[derive(Debug)]
pub struct LayerFeatures {
	pub name: String,
	pub features: Vec<VectorFeature>,
}

/// All features of a single tile, in ascending sort-key order.
pub struct TileFeatures {
	coord: TileCoord,
	entries: Vec<SortEntry>,
	num_features_processed: u64,
	current_layer: Option<u8>,
	group_counts: HashMap<i64, u64>,
	decoder: FeatureDecoder,
	profile: Arc<dyn Profile>,
	stats: Arc<dyn Stats>,
}

impl TileFeatures {
	fn new(
		coord: TileCoord,
		decoder: FeatureDecoder,
		profile: Arc<dyn Profile>,
		stats: Arc<dyn Stats>,
	) -> TileFeatures {
		TileFeatures {
			coord,
			entries: Vec::new(),
			num_features_processed: 0,
			current_layer: None,
			group_counts: HashMap::new(),
			decoder,
			profile,
			stats,
		}
	}

	/// Appends one entry, enforcing group cardinality caps per layer.
	fn add(&mut self, entry: SortEntry) -> Result<()> {
		self.num_features_processed += 1;

		let layer_id = SortKey::layer_id_of(entry.key);
		if self.current_layer != Some(layer_id) {
			self.current_layer = Some(layer_id);
			self.group_counts.clear();
		}

		if let Some(info) = FeatureDecoder::peek_group(&entry)? {
			let count = self.group_counts.entry(info.group).or_insert(0);
			if info.limit > 0 && *count >= info.limit as u64 {
				// over the cap: counted, not emitted
				return Ok(());
			}
			*count += 1;
		}
		self.entries.push(entry);
		Ok(())
	}

	pub fn coord(&self) -> TileCoord {
		self.coord
	}

	/// Every feature that arrived for this tile, including ones dropped by a
	/// group cap.
	pub fn num_features_processed(&self) -> u64 {
		self.num_features_processed
	}

	/// Features that survived the group caps.
	pub fn num_features_to_emit(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Compares tile contents by (layer id, value bytes), ignoring the tile
	/// bits of the keys. Two far-apart ocean tiles filled with the same
	/// polygon compare equal, which lets the writer deduplicate them.
	pub fn has_same_contents(&self, other: &TileFeatures) -> bool {
		self.entries.len() == other.entries.len()
			&& self
				.entries
				.iter()
				.zip(&other.entries)
				.all(|(a, b)| SortKey::layer_id_of(a.key) == SortKey::layer_id_of(b.key) && a.value == b.value)
	}

	/// Decodes the tile into per-layer feature lists in draw order
	/// (bottom-most first) and runs the profile's post-processing on each
	/// layer.
	///
	/// Recoverable geometry errors demote the affected layer to its
	/// unprocessed features; fatal errors propagate.
	pub fn layer_features(&self) -> Result<Vec<LayerFeatures>> {
		let mut layers: Vec<LayerFeatures> = Vec::new();

		// entries are sorted by inverted z-order; walking them backwards
		// yields draw order, bottom-most feature first
		for (layer_id, entries) in &self
			.entries
			.iter()
			.rev()
			.chunk_by(|entry| SortKey::layer_id_of(entry.key))
		{
			let name = self.decoder.layer_name(layer_id)?;
			let features = entries
				.map(|entry| self.decoder.decode(entry).map(|decoded| decoded.feature))
				.collect::<Result<Vec<_>>>()?;
			layers.push(self.post_process(name, features)?);
		}
		Ok(layers)
	}

	fn post_process(&self, name: String, features: Vec<VectorFeature>) -> Result<LayerFeatures> {
		let zoom = self.coord.z;
		match self
			.profile
			.post_process_layer_features(&name, zoom, features.clone())
		{
			Ok(None) => Ok(LayerFeatures { name, features }),
			Ok(Some(processed)) => Ok(LayerFeatures {
				name,
				features: processed,
			}),
			Err(PostProcessError::Geometry(err)) => {
				warn!("post-processing layer {name:?} of {:?} failed: {err}", self.coord);
				self.stats.data_error(POST_PROCESS_ERROR);
				Ok(LayerFeatures { name, features })
			}
			Err(PostProcessError::Fatal(err)) => {
				Err(err.context(format!("post-processing layer {name:?} of {:?}", self.coord)))
			}
		}
	}
}

/// Yields tiles in ascending encoded-id order. One-shot, single consumer;
/// polls the cancellation token between tiles.
pub struct TileIter {
	stream: Peekable<SortedStream>,
	decoder: FeatureDecoder,
	profile: Arc<dyn Profile>,
	stats: Arc<dyn Stats>,
	cancel: CancellationToken,
}

impl TileIter {
	fn collect_tile(&mut self, first: SortEntry) -> Result<TileFeatures> {
		let tile_id = SortKey::tile_id_of(first.key);
		let coord = TileCoord::from_encoded(tile_id).context("invalid tile id in sort key")?;
		let mut tile = TileFeatures::new(
			coord,
			self.decoder.clone(),
			self.profile.clone(),
			self.stats.clone(),
		);
		tile.add(first)?;

		loop {
			match self.stream.peek() {
				None => break,
				Some(Err(_)) => {
					let err = self.stream.next().unwrap().unwrap_err();
					return Err(err);
				}
				Some(Ok(entry)) if SortKey::tile_id_of(entry.key) == tile_id => {
					let entry = self.stream.next().unwrap()?;
					tile.add(entry)?;
				}
				Some(Ok(_)) => break,
			}
		}
		Ok(tile)
	}
}

impl Iterator for TileIter {
	type Item = Result<TileFeatures>;

	fn next(&mut self) -> Option<Self::Item> {
		if let Err(err) = self.cancel.check() {
			return Some(Err(err));
		}
		let first = match self.stream.next()? {
			Ok(entry) => entry,
			Err(err) => return Some(Err(err)),
		};
		Some(self.collect_tile(first))
	}
}
