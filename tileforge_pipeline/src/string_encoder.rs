//! Bounded bijective dictionaries between strings and 8-bit ids.
//!
//! Layer names and attribute keys travel through the sort as single bytes.
//! A dictionary holds at most 250 distinct strings; ids 1..=250 are handed
//! out in insertion order and the byte values 0 and 251..=255 are reserved
//! and never returned. Entries are never rewritten or removed.

use anyhow::{Result, ensure};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Ids start at 1; 0 stays reserved.
const FIRST_ID: u8 = 1;
/// 250 usable ids, leaving 251..=255 reserved.
const MAX_ENTRIES: usize = 250;

#[derive(Default)]
struct Inner {
	names: Vec<String>,
	ids: HashMap<String, u8>,
}

/// A grow-only dictionary for one namespace (layer names or attribute keys).
///
/// Reads are concurrent; inserts go through the write lock. Saturation is a
/// hard error naming the namespace, because a silent wrap would corrupt
/// every record encoded afterwards.
pub struct CommonStringEncoder {
	namespace: &'static str,
	inner: RwLock<Inner>,
}

impl CommonStringEncoder {
	pub fn new(namespace: &'static str) -> CommonStringEncoder {
		CommonStringEncoder {
			namespace,
			inner: RwLock::new(Inner::default()),
		}
	}

	/// Returns the id for `text`, inserting it on first sight.
	pub fn encode(&self, text: &str) -> Result<u8> {
		if let Some(&id) = self.inner.read().ids.get(text) {
			return Ok(id);
		}

		let mut inner = self.inner.write();
		if let Some(&id) = inner.ids.get(text) {
			return Ok(id);
		}
		ensure!(
			inner.names.len() < MAX_ENTRIES,
			"string dictionary \"{}\" is saturated: more than {MAX_ENTRIES} distinct values (rejected {text:?})",
			self.namespace
		);
		let id = inner.names.len() as u8 + FIRST_ID;
		inner.names.push(text.to_string());
		inner.ids.insert(text.to_string(), id);
		Ok(id)
	}

	/// Looks an id back up.
	pub fn decode(&self, id: u8) -> Result<String> {
		let inner = self.inner.read();
		let index = (id as usize).wrapping_sub(FIRST_ID as usize);
		ensure!(
			index < inner.names.len(),
			"string dictionary \"{}\" has no entry for id {id}",
			self.namespace
		);
		Ok(inner.names[index].clone())
	}

	pub fn len(&self) -> usize {
		self.inner.read().names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
