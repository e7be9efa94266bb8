//! Capability contracts the pipeline exposes to surrounding code.
//!
//! A [`Profile`] owns the schema knowledge the core deliberately does not
//! have: which layers get their lines merged, which get polygon union, with
//! which parameters. [`Stats`] is the best-effort observability sink; none
//! of its methods may influence semantics.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use tileforge_geometry::vector_tile::VectorFeature;

/// Failure modes of a layer post-processing callback.
#[derive(Debug)]
pub enum PostProcessError {
	/// Invalid or degenerate geometry. The affected layer falls back to its
	/// unprocessed features and the pipeline continues.
	Geometry(anyhow::Error),
	/// Resource exhaustion or a broken invariant. Aborts the pipeline.
	Fatal(anyhow::Error),
}

impl fmt::Display for PostProcessError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PostProcessError::Geometry(err) => write!(f, "geometry error: {err}"),
			PostProcessError::Fatal(err) => write!(f, "fatal post-process error: {err}"),
		}
	}
}

impl std::error::Error for PostProcessError {}

/// Schema callbacks invoked by the pipeline.
pub trait Profile: Send + Sync {
	/// Reworks one layer of one tile. The features arrive in draw order,
	/// bottom-most first. Returning `Ok(None)` means "unchanged".
	fn post_process_layer_features(
		&self,
		layer: &str,
		zoom: u8,
		features: Vec<VectorFeature>,
	) -> Result<Option<Vec<VectorFeature>>, PostProcessError> {
		let _ = (layer, zoom, features);
		Ok(None)
	}
}

/// A profile that changes nothing.
pub struct PassthroughProfile;

impl Profile for PassthroughProfile {}

/// Best-effort counters, gauges, stage markers and data-error codes.
pub trait Stats: Send + Sync {
	fn count(&self, metric: &str, delta: u64) {
		let _ = (metric, delta);
	}
	fn gauge(&self, metric: &str, value: u64) {
		let _ = (metric, value);
	}
	/// Marks the start of a pipeline stage.
	fn stage(&self, stage: &str) {
		let _ = stage;
	}
	/// Records a recoverable data problem under a stable code.
	fn data_error(&self, code: &str) {
		let _ = code;
	}
}

/// Discards everything.
pub struct NoopStats;

impl Stats for NoopStats {}

/// Collects everything in memory; handy in tests.
#[derive(Default)]
pub struct MemoryStats {
	counters: Mutex<BTreeMap<String, u64>>,
	gauges: Mutex<BTreeMap<String, u64>>,
	data_errors: Mutex<BTreeMap<String, u64>>,
}

impl MemoryStats {
	pub fn new() -> MemoryStats {
		MemoryStats::default()
	}

	pub fn counter_value(&self, metric: &str) -> u64 {
		self.counters.lock().get(metric).copied().unwrap_or(0)
	}

	pub fn gauge_value(&self, metric: &str) -> u64 {
		self.gauges.lock().get(metric).copied().unwrap_or(0)
	}

	pub fn data_error_count(&self, code: &str) -> u64 {
		self.data_errors.lock().get(code).copied().unwrap_or(0)
	}
}

impl Stats for MemoryStats {
	fn count(&self, metric: &str, delta: u64) {
		*self.counters.lock().entry(metric.to_string()).or_insert(0) += delta;
	}

	fn gauge(&self, metric: &str, value: u64) {
		self.gauges.lock().insert(metric.to_string(), value);
	}

	fn data_error(&self, code: &str) {
		*self.data_errors.lock().entry(code.to_string()).or_insert(0) += 1;
	}
}
