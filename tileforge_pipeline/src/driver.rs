//! The pipeline driver: wires ingestion, sort and tile iteration together.

use crate::config::PipelineConfig;
use crate::feature::RenderedFeature;
use crate::feature_group::{FeatureGroup, TileFeatures};
use crate::profile::{Profile, Stats};
use anyhow::Result;
use log::debug;
use std::sync::Arc;
use tileforge_core::CancellationToken;

/// Owns one ingest-sort-emit cycle.
///
/// Producers feed [`accept`](Pipeline::accept) from a single thread —
/// back-pressure comes from the sorter's bounded chunk, which blocks the
/// producer on disk while a spill is in flight. After
/// [`prepare`](Pipeline::prepare) the tiles stream out exactly once, in
/// ascending encoded-tile-id order.
pub struct Pipeline {
	config: PipelineConfig,
	group: FeatureGroup,
	stats: Arc<dyn Stats>,
	cancel: CancellationToken,
	features_accepted: u64,
}

impl Pipeline {
	pub fn new(config: &PipelineConfig, profile: Arc<dyn Profile>, stats: Arc<dyn Stats>) -> Result<Pipeline> {
		let cancel = CancellationToken::new();
		let group = FeatureGroup::new(config, profile, stats.clone(), cancel.clone())?;
		Ok(Pipeline {
			config: config.clone(),
			group,
			stats,
			cancel,
			features_accepted: 0,
		})
	}

	/// The configuration this pipeline runs with; profiles read the clip
	/// radius and tile extent from here.
	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	/// Token that aborts the pipeline between sort chunks and between tiles.
	pub fn cancellation_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	pub fn accept(&mut self, feature: &RenderedFeature) -> Result<()> {
		self.group.accept(feature)?;
		self.features_accepted += 1;
		Ok(())
	}

	/// Ends ingestion and sorts. Idempotent.
	pub fn prepare(&mut self) -> Result<()> {
		self.group.prepare()?;
		self.stats.count("features_accepted", self.features_accepted);
		self.stats.gauge("sort_disk_bytes", self.group.disk_usage_bytes());
		self.features_accepted = 0;
		Ok(())
	}

	/// Streams every tile through `emit`. Consumes the sorted data; calling
	/// it a second time yields nothing.
	pub fn for_each_tile(&mut self, mut emit: impl FnMut(&TileFeatures) -> Result<()>) -> Result<()> {
		self.stats.stage("emit");
		let mut tiles = 0u64;
		for tile in self.group.tiles()? {
			let tile = tile?;
			emit(&tile)?;
			tiles += 1;
		}
		self.stats.count("tiles_emitted", tiles);
		debug!("emitted {tiles} tiles");
		Ok(())
	}

	/// Convenience wrapper: ingest everything, sort, emit.
	pub fn run<I>(&mut self, features: I, emit: impl FnMut(&TileFeatures) -> Result<()>) -> Result<()>
	where
		I: IntoIterator<Item = RenderedFeature>,
	{
		for feature in features {
			self.accept(&feature)?;
		}
		self.prepare()?;
		self.for_each_tile(emit)
	}

	pub fn num_features_written(&self) -> u64 {
		self.group.num_features_written()
	}

	pub fn disk_usage_bytes(&self) -> u64 {
		self.group.disk_usage_bytes()
	}
}
