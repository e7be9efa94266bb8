//! End-to-end tests: ingest through the external sort, stream tiles back,
//! post-process layers through a profile.

use anyhow::Result;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tileforge_core::{CancellationToken, TileCoord};
use tileforge_geometry::geo::{AttrValue, Attributes, Geometry};
use tileforge_geometry::merge::{merge_line_strings, merge_nearby_polygons};
use tileforge_geometry::vector_tile::{VectorFeature, VectorGeometry};
use tileforge_pipeline::{
	FeatureBody, FeatureGroup, MemoryStats, PassthroughProfile, Pipeline, PipelineConfig,
	PostProcessError, Profile, RenderedFeature, TileFeatures,
};

fn small_sort_config(dir: &std::path::Path) -> PipelineConfig {
	PipelineConfig {
		temp_dir: dir.to_path_buf(),
		chunk_memory_budget_bytes: 256 * 1024,
		sort_parallelism: 2,
		..PipelineConfig::default()
	}
}

fn body(id: i64, geometry: &Geometry, attrs: Attributes) -> Arc<FeatureBody> {
	Arc::new(FeatureBody {
		id,
		geometry: VectorGeometry::from_geometry(geometry).unwrap(),
		attrs,
	})
}

fn rendered(tile: TileCoord, layer: &str, z_order: i32, body: Arc<FeatureBody>) -> RenderedFeature {
	RenderedFeature {
		tile,
		layer: layer.to_string(),
		z_order,
		group: None,
		body,
	}
}

fn ocean_body() -> Arc<FeatureBody> {
	body(
		1,
		&Geometry::new_polygon(vec![vec![
			[0.0, 0.0],
			[256.0, 0.0],
			[256.0, 256.0],
			[0.0, 256.0],
			[0.0, 0.0],
		]]),
		Attributes::from(vec![("kind", AttrValue::from("ocean"))]),
	)
}

/// Ingests far more features than one chunk holds, with pseudo-random tile
/// ids, and checks the stream comes back complete and tile-ordered.
#[test]
fn large_ingest_streams_tiles_in_order() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let stats = Arc::new(MemoryStats::new());
	let mut pipeline = Pipeline::new(&small_sort_config(dir.path()), Arc::new(PassthroughProfile), stats.clone())?;

	let point = body(1, &Geometry::new_point([128.0, 128.0]), Attributes::new());
	let total = 200_000u64;

	// deterministic xorshift ids in [0, 2^20)
	let mut state = 0x9E3779B97F4A7C15u64;
	for _ in 0..total {
		state ^= state << 13;
		state ^= state >> 7;
		state ^= state << 17;
		let tile_id = (state >> 32) as u32 & ((1 << 20) - 1);
		let tile = TileCoord::from_encoded(tile_id)?;
		pipeline.accept(&rendered(tile, "poi", 0, point.clone()))?;
	}
	pipeline.prepare()?;
	assert_eq!(pipeline.num_features_written(), total);
	// the budget was exceeded many times over, so the sort went to disk
	assert!(pipeline.disk_usage_bytes() > 0);

	let mut last_id: Option<u32> = None;
	let mut emitted = 0u64;
	pipeline.for_each_tile(|tile| {
		let id = tile.coord().encoded();
		if let Some(last) = last_id {
			assert!(id > last, "tile ids must strictly ascend");
		}
		last_id = Some(id);
		emitted += tile.num_features_to_emit() as u64;
		Ok(())
	})?;
	assert_eq!(emitted, total);
	assert_eq!(stats.counter_value("features_accepted"), total);
	Ok(())
}

/// A profile that merges road lines and unions landcover polygons.
struct MergingProfile;

impl Profile for MergingProfile {
	fn post_process_layer_features(
		&self,
		layer: &str,
		_zoom: u8,
		features: Vec<VectorFeature>,
	) -> Result<Option<Vec<VectorFeature>>, PostProcessError> {
		let merged = match layer {
			"roads" => merge_line_strings(features, 0.0, 0.0, 0.0),
			"landcover" => merge_nearby_polygons(features, 10.0, 3.0, 2.0),
			_ => return Ok(None),
		};
		merged.map(Some).map_err(PostProcessError::Geometry)
	}
}

#[test]
fn profile_post_processing_merges_layers() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let mut pipeline = Pipeline::new(
		&small_sort_config(dir.path()),
		Arc::new(MergingProfile),
		Arc::new(MemoryStats::new()),
	)?;

	let tile = TileCoord::new(11, 100, 100)?;
	let road_attrs = Attributes::from(vec![("class", AttrValue::from("primary"))]);
	let wood_attrs = Attributes::from(vec![("kind", AttrValue::from("wood"))]);

	let features = vec![
		rendered(
			tile,
			"roads",
			0,
			body(
				1,
				&Geometry::new_line_string(vec![[0.0, 0.0], [100.0, 0.0]]),
				road_attrs.clone(),
			),
		),
		rendered(
			tile,
			"roads",
			0,
			body(
				2,
				&Geometry::new_line_string(vec![[100.0, 0.0], [200.0, 0.0]]),
				road_attrs,
			),
		),
		rendered(
			tile,
			"landcover",
			0,
			body(
				3,
				&Geometry::new_polygon(vec![vec![
					[0.0, 0.0],
					[10.0, 0.0],
					[10.0, 10.0],
					[0.0, 10.0],
					[0.0, 0.0],
				]]),
				wood_attrs.clone(),
			),
		),
		rendered(
			tile,
			"landcover",
			0,
			body(
				4,
				&Geometry::new_polygon(vec![vec![
					[12.0, 0.0],
					[22.0, 0.0],
					[22.0, 10.0],
					[12.0, 10.0],
					[12.0, 0.0],
				]]),
				wood_attrs,
			),
		),
	];

	let mut seen_tiles = 0;
	pipeline.run(features, |tile_features| {
		seen_tiles += 1;
		let layers = tile_features.layer_features()?;
		assert_eq!(layers.len(), 2);

		for layer in &layers {
			match layer.name.as_str() {
				"roads" => {
					assert_eq!(layer.features.len(), 1);
					assert_eq!(
						layer.features[0].decode_geometry()?,
						Geometry::new_line_string(vec![[0.0, 0.0], [200.0, 0.0]])
					);
				}
				"landcover" => {
					assert_eq!(layer.features.len(), 1);
					let polygons = layer.features[0].decode_geometry()?.into_polygons()?;
					assert_eq!(polygons.len(), 1, "the two woods merged into one polygon");
				}
				other => panic!("unexpected layer {other:?}"),
			}
		}
		Ok(())
	})?;
	assert_eq!(seen_tiles, 1);
	Ok(())
}

/// Two far-apart tiles filled with the same ocean polygon decode to tiles a
/// writer may deduplicate via `has_same_contents`.
#[test]
fn identical_ocean_tiles_can_be_deduplicated() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let mut group = FeatureGroup::new(
		&small_sort_config(dir.path()),
		Arc::new(PassthroughProfile),
		Arc::new(MemoryStats::new()),
		CancellationToken::new(),
	)?;

	let ocean = ocean_body();
	group.accept(&rendered(TileCoord::new(8, 0, 0)?, "water", 0, ocean.clone()))?;
	group.accept(&rendered(TileCoord::new(8, 200, 13)?, "water", 0, ocean.clone()))?;
	group.prepare()?;

	let tiles: Vec<TileFeatures> = group.tiles()?.collect::<Result<_>>()?;
	assert_eq!(tiles.len(), 2);
	assert_ne!(tiles[0].coord(), tiles[1].coord());
	assert!(tiles[0].has_same_contents(&tiles[1]));
	Ok(())
}

#[test]
fn cancellation_aborts_between_tiles() -> Result<()> {
	let dir = tempfile::tempdir()?;
	let mut pipeline = Pipeline::new(
		&small_sort_config(dir.path()),
		Arc::new(PassthroughProfile),
		Arc::new(MemoryStats::new()),
	)?;
	let point = body(1, &Geometry::new_point([1.0, 1.0]), Attributes::new());
	for x in 0..4 {
		pipeline.accept(&rendered(TileCoord::new(4, x, 0)?, "poi", 0, point.clone()))?;
	}
	pipeline.prepare()?;

	let cancel = pipeline.cancellation_token();
	let mut seen = 0;
	let result = pipeline.for_each_tile(|_| {
		seen += 1;
		cancel.cancel();
		Ok(())
	});
	assert!(result.is_err());
	assert_eq!(seen, 1);
	Ok(())
}
