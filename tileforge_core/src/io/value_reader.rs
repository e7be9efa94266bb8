//! This module defines the [`ValueReader`] trait for reading binary values
//! from a readable source.
//!
//! # Examples
//!
//! ```rust
//! use tileforge_core::io::{ValueReader, ValueReaderSlice};
//! use anyhow::Result;
//!
//! fn main() -> Result<()> {
//!     let mut reader = ValueReaderSlice::new_le(&[0b10101100, 0b00000010]);
//!     assert_eq!(reader.read_varint()?, 300);
//!     Ok(())
//! }
//! ```

use crate::Blob;
use anyhow::{Result, bail};
use byteorder::{ByteOrder, ReadBytesExt};
use std::io::{Read, Seek};

/// Anything that can be both read from and repositioned.
pub trait SeekRead: Read + Seek {}
impl<T: Read + Seek> SeekRead for T {}

/// A trait for reading binary values from a source with a fixed byte order.
pub trait ValueReader<'a, E: ByteOrder> {
	/// Returns a mutable reference to the underlying reader.
	fn get_reader(&mut self) -> &mut dyn SeekRead;

	/// Total length of the readable data in bytes.
	fn len(&self) -> u64;

	/// Current read position.
	fn position(&mut self) -> u64;

	/// Moves the read position.
	fn set_position(&mut self, position: u64) -> Result<()>;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn remaining(&mut self) -> u64 {
		self.len() - self.position()
	}

	fn has_remaining(&mut self) -> bool {
		self.remaining() > 0
	}

	/// Reads an unsigned variable-length integer.
	///
	/// # Errors
	/// Fails if the source is exhausted or the varint runs longer than 70 bits.
	fn read_varint(&mut self) -> Result<u64> {
		let mut value = 0;
		let mut shift = 0;
		loop {
			let byte = self.get_reader().read_u8()?;
			value |= (u64::from(byte) & 0x7F) << shift;
			if byte & 0x80 == 0 {
				break;
			}
			shift += 7;
			if shift >= 70 {
				bail!("varint too long");
			}
		}
		Ok(value)
	}

	/// Reads a zigzag-encoded signed variable-length integer.
	fn read_svarint(&mut self) -> Result<i64> {
		let value = self.read_varint()? as i64;
		Ok((value >> 1) ^ -(value & 1))
	}

	fn read_u8(&mut self) -> Result<u8> {
		Ok(self.get_reader().read_u8()?)
	}

	fn read_u32(&mut self) -> Result<u32> {
		Ok(self.get_reader().read_u32::<E>()?)
	}

	fn read_u64(&mut self) -> Result<u64> {
		Ok(self.get_reader().read_u64::<E>()?)
	}

	fn read_f64(&mut self) -> Result<f64> {
		Ok(self.get_reader().read_f64::<E>()?)
	}

	/// Reads exactly `length` bytes into a [`Blob`].
	fn read_blob(&mut self, length: u64) -> Result<Blob> {
		let mut vec = vec![0u8; length as usize];
		self.get_reader().read_exact(&mut vec)?;
		Ok(Blob::from(vec))
	}

	/// Reads exactly `length` bytes and interprets them as UTF-8.
	fn read_string(&mut self, length: u64) -> Result<String> {
		let mut vec = vec![0u8; length as usize];
		self.get_reader().read_exact(&mut vec)?;
		Ok(String::from_utf8(vec)?)
	}
}
