use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::{DatasetError, FormatError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Open a gzip file as a decompressed byte stream.
///
/// Only the envelope's magic bytes are checked here. Deflate errors and the
/// CRC32 trailer surface while reading, as `InvalidData`/`InvalidInput` IO
/// errors, and are reported by the IDX reader as a corrupt archive.
pub fn open(path: &Path) -> Result<GzDecoder<BufReader<File>>> {
    let file = File::open(path)
        .map_err(|e| DatasetError::io(format!("opening {}", path.display()), e))?;
    let mut reader = BufReader::new(file);

    let head = reader
        .fill_buf()
        .map_err(|e| DatasetError::io(format!("reading {}", path.display()), e))?;
    if head.len() < GZIP_MAGIC.len() || head[..GZIP_MAGIC.len()] != GZIP_MAGIC {
        return Err(DatasetError::format(
            path.display().to_string(),
            FormatError::CorruptArchive(io::Error::new(
                io::ErrorKind::InvalidData,
                "missing gzip magic bytes",
            )),
        ));
    }

    Ok(GzDecoder::new(reader))
}
