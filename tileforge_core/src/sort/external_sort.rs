//! The external merge sort itself.

use super::run_file::{RunFile, RunReader, write_run};
use super::SortEntry;
use crate::CancellationToken;
use anyhow::{Context, Result, anyhow, ensure};
use log::{debug, warn};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

/// Chunks never grow beyond this many records, whatever the byte budget says.
const DEFAULT_ENTRY_LIMIT: usize = 1 << 21;

/// Bounded-memory sort of an arbitrary number of records by their 64-bit key.
///
/// Writes are single-threaded (`&mut self` enforces it) and stop being legal
/// once [`sort`](ExternalMergeSort::sort) has run; reads are a single pass
/// through [`iter`](ExternalMergeSort::iter). Run files live in a `sort-runs`
/// directory below the caller's scratch directory and are removed on drop.
pub struct ExternalMergeSort {
	dir: PathBuf,
	chunk_bytes_limit: u64,
	chunk_entry_limit: usize,
	parallelism: usize,
	cancel: CancellationToken,
	current: Vec<SortEntry>,
	current_bytes: u64,
	pending: Vec<Vec<SortEntry>>,
	runs: Vec<RunFile>,
	in_memory: Option<Vec<SortEntry>>,
	sorted: bool,
	entries_written: u64,
	next_run_id: usize,
}

impl ExternalMergeSort {
	/// Creates a sorter spilling below `scratch_dir`.
	///
	/// `memory_budget_bytes` bounds the bytes held across all in-flight
	/// chunks; `parallelism` chunks are sorted concurrently, so each single
	/// chunk gets `memory_budget_bytes / parallelism`.
	pub fn new(
		scratch_dir: &Path,
		memory_budget_bytes: u64,
		parallelism: usize,
		cancel: CancellationToken,
	) -> Result<ExternalMergeSort> {
		let dir = scratch_dir.join("sort-runs");
		fs::create_dir_all(&dir).with_context(|| format!("creating sort scratch directory {dir:?}"))?;
		let parallelism = parallelism.max(1);

		Ok(ExternalMergeSort {
			chunk_bytes_limit: (memory_budget_bytes / parallelism as u64).max(1),
			chunk_entry_limit: DEFAULT_ENTRY_LIMIT,
			parallelism,
			cancel,
			dir,
			current: Vec::new(),
			current_bytes: 0,
			pending: Vec::new(),
			runs: Vec::new(),
			in_memory: None,
			sorted: false,
			entries_written: 0,
			next_run_id: 0,
		})
	}

	/// Caps chunks by record count as well as by bytes.
	pub fn with_entry_limit(mut self, limit: usize) -> ExternalMergeSort {
		self.chunk_entry_limit = limit.max(1);
		self
	}

	/// Adds one record. Spills filled chunks to disk as a side effect.
	pub fn add(&mut self, entry: SortEntry) -> Result<()> {
		ensure!(!self.sorted, "sorter is read-only after sort()");
		self.entries_written += 1;
		self.current_bytes += entry.estimated_bytes();
		self.current.push(entry);

		if self.current.len() >= self.chunk_entry_limit || self.current_bytes >= self.chunk_bytes_limit {
			self.rotate_chunk();
			if self.pending.len() >= self.parallelism {
				self.spill_pending()?;
			}
		}
		Ok(())
	}

	/// Finishes ingestion. Idempotent; after this call the sorter only reads.
	///
	/// When nothing was ever spilled the single in-memory chunk is sorted
	/// and kept as the iteration source, avoiding disk entirely.
	pub fn sort(&mut self) -> Result<()> {
		if self.sorted {
			return Ok(());
		}
		if self.runs.is_empty() && self.pending.is_empty() {
			self.current.sort_by_key(|e| e.key);
			self.in_memory = Some(mem::take(&mut self.current));
			self.current_bytes = 0;
		} else {
			self.rotate_chunk();
			self.spill_pending()?;
		}
		self.sorted = true;
		debug!(
			"sorted {} entries, {} run files, {} bytes on disk",
			self.entries_written,
			self.runs.len(),
			self.disk_usage_bytes()
		);
		Ok(())
	}

	/// Opens the merged stream. One-shot, single consumer.
	pub fn iter(&mut self) -> Result<SortedStream> {
		ensure!(self.sorted, "sort() must run before iteration");
		if let Some(entries) = self.in_memory.take() {
			return Ok(SortedStream::Memory(entries.into_iter()));
		}
		let readers = self
			.runs
			.iter()
			.map(|run| RunReader::open(&run.path))
			.collect::<Result<Vec<_>>>()?;
		Ok(SortedStream::Merge(KWayMerge::new(readers)))
	}

	/// Total records accepted by `add`.
	pub fn num_entries_written(&self) -> u64 {
		self.entries_written
	}

	/// Sum of the current run file sizes.
	pub fn disk_usage_bytes(&self) -> u64 {
		self.runs.iter().map(|run| run.bytes).sum()
	}

	fn rotate_chunk(&mut self) {
		if !self.current.is_empty() {
			self.pending.push(mem::take(&mut self.current));
			self.current_bytes = 0;
		}
	}

	/// Sorts all pending chunks (in parallel when allowed) and writes each to
	/// its own run file. Run order stays deterministic: paths are assigned
	/// before the workers start.
	fn spill_pending(&mut self) -> Result<()> {
		self.cancel.check()?;
		if self.pending.is_empty() {
			return Ok(());
		}

		let mut jobs: Vec<(PathBuf, Vec<SortEntry>)> = Vec::new();
		for chunk in mem::take(&mut self.pending) {
			let path = self.dir.join(format!("run-{:06}", self.next_run_id));
			self.next_run_id += 1;
			jobs.push((path, chunk));
		}

		let runs = if jobs.len() == 1 || self.parallelism == 1 {
			jobs
				.into_iter()
				.map(|(path, mut chunk)| {
					chunk.sort_by_key(|e| e.key);
					write_run(&path, &chunk)
				})
				.collect::<Result<Vec<_>>>()?
		} else {
			std::thread::scope(|scope| {
				let handles: Vec<_> = jobs
					.into_iter()
					.map(|(path, mut chunk)| {
						scope.spawn(move || {
							chunk.sort_by_key(|e| e.key);
							write_run(&path, &chunk)
						})
					})
					.collect();
				handles
					.into_iter()
					.map(|handle| handle.join().map_err(|_| anyhow!("chunk sort worker panicked"))?)
					.collect::<Result<Vec<_>>>()
			})?
		};

		debug!("spilled {} chunk(s) to {:?}", runs.len(), self.dir);
		self.runs.extend(runs);
		Ok(())
	}
}

impl Drop for ExternalMergeSort {
	fn drop(&mut self) {
		for run in &self.runs {
			if let Err(err) = fs::remove_file(&run.path) {
				warn!("could not remove run file {:?}: {err}", run.path);
			}
		}
		let _ = fs::remove_dir(&self.dir);
	}
}

/// The merged, key-ascending record stream.
pub enum SortedStream {
	Memory(std::vec::IntoIter<SortEntry>),
	Merge(KWayMerge),
}

impl Iterator for SortedStream {
	type Item = Result<SortEntry>;

	fn next(&mut self) -> Option<Self::Item> {
		match self {
			SortedStream::Memory(iter) => iter.next().map(Ok),
			SortedStream::Merge(merge) => merge.next_entry().transpose(),
		}
	}
}

/// K-way merge over open run readers, driven by a min-heap on
/// `(next key, run index)`. Ties break on run index, which makes the merge
/// stable; keys are unique in practice so this is belt only.
pub struct KWayMerge {
	readers: Vec<RunReader>,
	heap: BinaryHeap<Reverse<(u64, usize)>>,
}

impl KWayMerge {
	fn new(readers: Vec<RunReader>) -> KWayMerge {
		let heap = readers
			.iter()
			.enumerate()
			.filter_map(|(idx, reader)| reader.peek_key().map(|key| Reverse((key, idx))))
			.collect();
		KWayMerge { readers, heap }
	}

	fn next_entry(&mut self) -> Result<Option<SortEntry>> {
		let Some(Reverse((_, idx))) = self.heap.pop() else {
			return Ok(None);
		};
		let entry = self.readers[idx]
			.advance()?
			.ok_or_else(|| anyhow!("run reader drained behind the merge heap"))?;
		if let Some(key) = self.readers[idx].peek_key() {
			self.heap.push(Reverse((key, idx)));
		}
		Ok(Some(entry))
	}
}
