//! Error types for the ingestion pipeline.
//!
//! Every failure aborts the current load; nothing here is logged and
//! swallowed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::DigestAlgorithm;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("digest mismatch for {}: expected {algorithm} {expected}, got {actual}", .path.display())]
    Integrity {
        path: PathBuf,
        algorithm: DigestAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid file format in {file}: {reason}")]
    Format {
        file: String,
        #[source]
        reason: FormatError,
    },

    #[error("label {label} at record {index} in {file} is out of range for {classes} classes")]
    Range {
        file: String,
        index: usize,
        label: u8,
        classes: usize,
    },

    #[error("dataset misaligned for {split} split: {images} images vs {labels} labels")]
    Misaligned {
        split: String,
        images: usize,
        labels: usize,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("array shape mismatch")]
    Shape(#[from] ndarray::ShapeError),
}

/// Reasons an input file is structurally unusable.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("expected magic number {expected}, found {actual}")]
    BadMagic { expected: u32, actual: u32 },

    #[error("truncated header")]
    TruncatedHeader,

    #[error("truncated record stream at record {index} of {count}")]
    TruncatedRecords { index: usize, count: usize },

    #[error("corrupt archive")]
    CorruptArchive(#[source] io::Error),

    #[error("records are {actual} bytes, expected {expected}")]
    RecordLength { expected: usize, actual: usize },

    #[error("{count} records of {record_len} bytes overflow addressable memory")]
    Oversized { count: usize, record_len: usize },

    #[error("images are {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    GeometryMismatch {
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("malformed csv record on line {line}: {detail}")]
    MalformedCsv { line: u64, detail: String },
}

impl DatasetError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn format(file: impl Into<String>, reason: FormatError) -> Self {
        Self::Format {
            file: file.into(),
            reason,
        }
    }

    /// Transport failures may succeed on a later attempt; everything else
    /// signals bad data or bad configuration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http { .. } | Self::HttpStatus { .. } | Self::Io { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
