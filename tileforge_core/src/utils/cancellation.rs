//! Cooperative cancellation for long-running phases.
//!
//! The pipeline is cancellable between units of work, never inside one: the
//! sorter polls the token between chunk spills and the tile iterator polls it
//! between tiles. A single in-flight geometry operation is not interruptible.

use anyhow::{Result, ensure};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cheaply clonable flag that signals cancellation to all holders.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
	#[must_use]
	pub fn new() -> CancellationToken {
		CancellationToken::default()
	}

	/// Requests cancellation. Idempotent.
	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}

	/// Fails with a "cancelled" error when cancellation was requested.
	/// Call this at suspension points.
	pub fn check(&self) -> Result<()> {
		ensure!(!self.is_cancelled(), "operation cancelled");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn starts_live() {
		let token = CancellationToken::new();
		assert!(!token.is_cancelled());
		assert!(token.check().is_ok());
	}

	#[test]
	fn cancel_is_visible_through_clones() {
		let token = CancellationToken::new();
		let clone = token.clone();
		token.cancel();
		assert!(clone.is_cancelled());
		assert!(clone.check().is_err());
	}
}
