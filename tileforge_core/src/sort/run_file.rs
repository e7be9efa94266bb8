//! Sorted run files on disk.
//!
//! Format: a plain sequence of `u64 key (LE) | varint length | value bytes`
//! records. End of file is end of run; there is no framing or checksum. A
//! record cut short at the tail makes the whole run unusable and the read
//! side fails hard instead of guessing.

use super::SortEntry;
use crate::Blob;
use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// A completed run on disk.
#[derive(Debug)]
pub(crate) struct RunFile {
	pub path: PathBuf,
	pub bytes: u64,
	pub entries: u64,
}

/// Writes a sorted chunk as a new run file.
pub(crate) fn write_run(path: &Path, entries: &[SortEntry]) -> Result<RunFile> {
	let file = File::create(path).with_context(|| format!("creating run file {path:?}"))?;
	let mut writer = BufWriter::new(file);
	let mut bytes = 0u64;

	for entry in entries {
		writer.write_u64::<LittleEndian>(entry.key)?;
		bytes += 8;
		bytes += write_varint(&mut writer, entry.value.len())?;
		writer.write_all(entry.value.as_slice())?;
		bytes += entry.value.len();
	}
	writer.flush().with_context(|| format!("flushing run file {path:?}"))?;

	Ok(RunFile {
		path: path.to_path_buf(),
		bytes,
		entries: entries.len() as u64,
	})
}

/// Streams one run file back, one record ahead.
pub(crate) struct RunReader {
	path: PathBuf,
	reader: BufReader<File>,
	next: Option<SortEntry>,
}

impl RunReader {
	pub fn open(path: &Path) -> Result<RunReader> {
		let file = File::open(path).with_context(|| format!("opening run file {path:?}"))?;
		let mut run = RunReader {
			path: path.to_path_buf(),
			reader: BufReader::new(file),
			next: None,
		};
		run.next = run.read_record()?;
		Ok(run)
	}

	/// Key of the record that `advance` will return next.
	pub fn peek_key(&self) -> Option<u64> {
		self.next.as_ref().map(|e| e.key)
	}

	/// Returns the current record and reads the following one.
	pub fn advance(&mut self) -> Result<Option<SortEntry>> {
		let current = self.next.take();
		if current.is_some() {
			self.next = self.read_record()?;
		}
		Ok(current)
	}

	fn read_record(&mut self) -> Result<Option<SortEntry>> {
		let mut key_bytes = [0u8; 8];
		match read_up_to(&mut self.reader, &mut key_bytes)? {
			0 => return Ok(None),
			8 => {}
			n => bail!("run file {:?} is truncated ({n} stray bytes at tail)", self.path),
		}
		let key = u64::from_le_bytes(key_bytes);

		let length = read_varint(&mut self.reader)
			.with_context(|| format!("run file {:?} is truncated inside a record header", self.path))?;
		let mut value = vec![0u8; length as usize];
		self
			.reader
			.read_exact(&mut value)
			.with_context(|| format!("run file {:?} is truncated inside a record body", self.path))?;

		Ok(Some(SortEntry::new(key, Blob::from(value))))
	}
}

fn write_varint(writer: &mut impl Write, mut value: u64) -> Result<u64> {
	let mut written = 0u64;
	while value >= 0x80 {
		writer.write_all(&[((value & 0x7F) as u8) | 0x80])?;
		value >>= 7;
		written += 1;
	}
	writer.write_all(&[value as u8])?;
	Ok(written + 1)
}

fn read_varint(reader: &mut impl Read) -> Result<u64> {
	let mut value = 0u64;
	let mut shift = 0;
	loop {
		let byte = reader.read_u8()?;
		value |= (u64::from(byte) & 0x7F) << shift;
		if byte & 0x80 == 0 {
			return Ok(value);
		}
		shift += 7;
		if shift >= 70 {
			bail!("varint too long");
		}
	}
}

/// Reads as many bytes as the source still has, up to `buf.len()`.
fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
	let mut filled = 0;
	while filled < buf.len() {
		let n = reader.read(&mut buf[filled..])?;
		if n == 0 {
			break;
		}
		filled += n;
	}
	Ok(filled)
}
