//! Binary value readers and writers.
//!
//! The feature codec and the sort run files share one small binary
//! vocabulary: unsigned varints, zigzag-encoded signed varints and a few
//! fixed-width primitives. [`ValueReader`] and [`ValueWriter`] define that
//! vocabulary once, generic over [`byteorder::ByteOrder`]; the concrete
//! implementations read from byte slices and write into an in-memory
//! [`crate::Blob`].

mod value_reader;
mod value_reader_slice;
mod value_writer;
mod value_writer_blob;

pub use value_reader::*;
pub use value_reader_slice::*;
pub use value_writer::*;
pub use value_writer_blob::*;
