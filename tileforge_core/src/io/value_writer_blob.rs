//! This module provides [`ValueWriterBlob`] for writing values into an
//! in-memory buffer.
//!
//! The writer can be `reset` and reused between records, which is what the
//! feature encoder relies on to avoid a fresh allocation per feature.

use super::ValueWriter;
use crate::Blob;
use anyhow::Result;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::{Cursor, Write};
use std::marker::PhantomData;

/// Writes binary values into a growable in-memory buffer.
pub struct ValueWriterBlob<E: ByteOrder> {
	_phantom: PhantomData<E>,
	cursor: Cursor<Vec<u8>>,
}

impl<E: ByteOrder> ValueWriterBlob<E> {
	pub fn new() -> ValueWriterBlob<E> {
		ValueWriterBlob {
			_phantom: PhantomData,
			cursor: Cursor::new(Vec::new()),
		}
	}

	/// Consumes the writer and returns the written bytes.
	pub fn into_blob(self) -> Blob {
		Blob::from(self.cursor.into_inner())
	}

	/// Copies the written bytes out without consuming the writer.
	pub fn to_blob(&self) -> Blob {
		Blob::from(self.cursor.get_ref().as_slice())
	}

	/// Clears the buffer so the writer can be reused for the next record.
	/// The allocation is kept.
	pub fn reset(&mut self) {
		self.cursor.get_mut().clear();
		self.cursor.set_position(0);
	}

	pub fn len(&self) -> u64 {
		self.cursor.get_ref().len() as u64
	}

	pub fn is_empty(&self) -> bool {
		self.cursor.get_ref().is_empty()
	}
}

impl ValueWriterBlob<LittleEndian> {
	/// Creates a little-endian in-memory writer.
	pub fn new_le() -> ValueWriterBlob<LittleEndian> {
		ValueWriterBlob::new()
	}
}

impl ValueWriterBlob<BigEndian> {
	/// Creates a big-endian in-memory writer.
	pub fn new_be() -> ValueWriterBlob<BigEndian> {
		ValueWriterBlob::new()
	}
}

impl<E: ByteOrder> ValueWriter<E> for ValueWriterBlob<E> {
	fn get_writer(&mut self) -> &mut dyn Write {
		&mut self.cursor
	}

	fn position(&mut self) -> Result<u64> {
		Ok(self.cursor.position())
	}
}

impl<E: ByteOrder> Default for ValueWriterBlob<E> {
	fn default() -> Self {
		Self::new()
	}
}
