//! IDX header parsing and fixed-size record reading.
//!
//! An IDX file is a big-endian magic number, a big-endian record count, zero
//! or more big-endian dimension sizes and then the raw unsigned-byte records.
//! Image and label files share the first two fields, so one header shape
//! parameterized by [`IdxLayout`] covers both.

use std::io::{self, Read};

use tracing::debug;

use crate::error::{DatasetError, FormatError, Result};

pub const IMAGE_MAGIC: u32 = 2051;
pub const LABEL_MAGIC: u32 = 2049;

// A record buffer grows as bytes arrive beyond this size.
const PREALLOC_RECORD: usize = 1 << 20;

/// Expected magic number and number of dimension fields following the count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdxLayout {
    pub magic: u32,
    pub dims: usize,
}

impl IdxLayout {
    pub const IMAGES: IdxLayout = IdxLayout {
        magic: IMAGE_MAGIC,
        dims: 2,
    };
    pub const LABELS: IdxLayout = IdxLayout {
        magic: LABEL_MAGIC,
        dims: 0,
    };
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdxHeader {
    pub magic: u32,
    pub count: usize,
    /// Per-record dimensions, e.g. `[rows, cols]` for images, empty for labels.
    pub shape: Vec<usize>,
}

impl IdxHeader {
    /// Bytes per record. Labels have no dimension fields and one byte each.
    pub fn record_len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn rows(&self) -> Option<usize> {
        self.shape.first().copied()
    }

    pub fn cols(&self) -> Option<usize> {
        self.shape.get(1).copied()
    }
}

/// A named byte stream positioned at the start of an IDX file.
///
/// The name only appears in error messages.
pub struct IdxReader<R> {
    name: String,
    inner: R,
}

impl<R: Read> IdxReader<R> {
    pub fn new(name: impl Into<String>, inner: R) -> IdxReader<R> {
        IdxReader {
            name: name.into(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read and validate the header. A magic number other than
    /// `layout.magic` is a hard failure.
    pub fn read_header(&mut self, layout: IdxLayout) -> Result<IdxHeader> {
        let magic = self.read_u32()?;
        if magic != layout.magic {
            return Err(DatasetError::format(
                self.name.clone(),
                FormatError::BadMagic {
                    expected: layout.magic,
                    actual: magic,
                },
            ));
        }

        let count = self.read_u32()? as usize;
        let shape = (0..layout.dims)
            .map(|_| self.read_u32().map(|d| d as usize))
            .collect::<Result<Vec<_>>>()?;

        let record_len = shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d));
        if record_len.and_then(|len| count.checked_mul(len)).is_none() {
            return Err(DatasetError::format(
                self.name.clone(),
                FormatError::Oversized {
                    count,
                    record_len: record_len.unwrap_or(usize::MAX),
                },
            ));
        }

        let header = IdxHeader {
            magic,
            count,
            shape,
        };

        debug!(file = %self.name, magic, count, shape = ?header.shape, "Parsed IDX header");
        Ok(header)
    }

    /// Lazily read the `header.count` records that follow the header.
    pub fn records(self, header: &IdxHeader) -> Records<R> {
        Records {
            reader: self,
            record_len: header.record_len(),
            count: header.count,
            index: 0,
            done: false,
        }
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| self.stream_error(e, || FormatError::TruncatedHeader))?;

        Ok(u32::from_be_bytes(buf))
    }

    /// Consume whatever follows the last record so a compressed stream gets
    /// to verify its trailer.
    fn drain(&mut self) -> Result<()> {
        let trailing = io::copy(&mut self.inner, &mut io::sink()).map_err(|e| {
            DatasetError::format(self.name.clone(), FormatError::CorruptArchive(e))
        })?;
        if trailing > 0 {
            debug!(file = %self.name, bytes = trailing, "Ignoring bytes after last record");
        }

        Ok(())
    }

    fn stream_error(&self, err: io::Error, on_eof: impl FnOnce() -> FormatError) -> DatasetError {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => DatasetError::format(self.name.clone(), on_eof()),
            io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
                DatasetError::format(self.name.clone(), FormatError::CorruptArchive(err))
            }
            _ => DatasetError::io(format!("reading {}", self.name), err),
        }
    }
}

/// Raw records of an IDX file, one `Vec<u8>` of `record_len` bytes each.
///
/// Stops after the first error. After the last record the rest of the
/// stream is drained, and a corrupt trailer is yielded as a final error.
pub struct Records<R> {
    reader: IdxReader<R>,
    record_len: usize,
    count: usize,
    index: usize,
    done: bool,
}

impl<R: Read> Records<R> {
    pub fn name(&self) -> &str {
        self.reader.name()
    }

    /// Index of the next record.
    pub fn position(&self) -> usize {
        self.index
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.index == self.count {
            self.done = true;
            return self.reader.drain().err().map(Err);
        }

        let (index, count) = (self.index, self.count);
        let mut record = Vec::with_capacity(self.record_len.min(PREALLOC_RECORD));
        let read = (&mut self.reader.inner)
            .take(self.record_len as u64)
            .read_to_end(&mut record);
        match read {
            Ok(n) if n == self.record_len => {}
            Ok(_) => {
                self.done = true;
                return Some(Err(DatasetError::format(
                    self.reader.name.clone(),
                    FormatError::TruncatedRecords { index, count },
                )));
            }
            Err(e) => {
                self.done = true;
                return Some(Err(self
                    .reader
                    .stream_error(e, || FormatError::TruncatedRecords { index, count })));
            }
        }

        self.index += 1;
        Some(Ok(record))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        // One extra item is possible if the trailer turns out corrupt.
        let remaining = self.count - self.index;
        (remaining, Some(remaining + 1))
    }
}
