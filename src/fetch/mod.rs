//! Cache resolution and integrity-checked download of remote resources.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256, Sha512};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{DatasetError, Result};

pub mod transport;

pub use transport::{HttpTransport, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Length of a hex encoded digest.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 64,
            DigestAlgorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => write!(f, "sha256"),
            DigestAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(DigestAlgorithm::Sha512),
            other => Err(DatasetError::Config(format!(
                "unknown digest algorithm '{other}'"
            ))),
        }
    }
}

/// An expected digest for a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Digest {
    pub algorithm: DigestAlgorithm,
    pub hex: String,
}

impl Digest {
    pub fn new(algorithm: DigestAlgorithm, hex: impl Into<String>) -> Digest {
        Digest {
            algorithm,
            hex: hex.into(),
        }
    }

    pub fn sha256(hex: impl Into<String>) -> Digest {
        Digest::new(DigestAlgorithm::Sha256, hex)
    }

    /// Check that `hex` has the right length and alphabet for the algorithm.
    pub fn validate(&self) -> Result<()> {
        if self.hex.len() != self.algorithm.hex_len()
            || !self.hex.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Err(DatasetError::Config(format!(
                "'{}' is not a valid {} digest",
                self.hex, self.algorithm
            )));
        }

        Ok(())
    }

    /// Case-insensitive comparison against a computed hex digest.
    pub fn matches(&self, actual: &str) -> bool {
        self.hex.eq_ignore_ascii_case(actual)
    }
}

/// A file known by its cache location and origin.
#[derive(Clone, Debug)]
pub struct RemoteResource {
    /// Location relative to the cache directory.
    pub relative_path: PathBuf,
    pub url: String,
    pub digest: Option<Digest>,
}

impl RemoteResource {
    pub fn local_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(&self.relative_path)
    }
}

/// Hash everything `reader` yields and return the lowercase hex digest.
pub fn hash_reader<R: Read>(reader: &mut R, algorithm: DigestAlgorithm) -> io::Result<String> {
    match algorithm {
        DigestAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            io::copy(reader, &mut hasher)?;
            Ok(format!("{:x}", hasher.finalize()))
        }
        DigestAlgorithm::Sha512 => {
            let mut hasher = Sha512::new();
            io::copy(reader, &mut hasher)?;
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}

pub fn file_digest(path: &Path, algorithm: DigestAlgorithm) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| DatasetError::io(format!("opening {}", path.display()), e))?;

    hash_reader(&mut BufReader::new(file), algorithm)
        .map_err(|e| DatasetError::io(format!("hashing {}", path.display()), e))
}

/// Make sure `resource` is present under `cache_dir` and return its path.
///
/// An existing file is accepted as is when no digest is configured. With a
/// digest, an existing file is re-hashed and replaced on mismatch. Fresh
/// downloads land in a temporary file next to the destination and only get
/// renamed into place once they pass verification.
pub fn ensure<T>(cache_dir: &Path, resource: &RemoteResource, transport: &T) -> Result<PathBuf>
where
    T: Transport + ?Sized,
{
    let path = resource.local_path(cache_dir);

    if path.is_file() {
        match &resource.digest {
            None => {
                debug!(path = %path.display(), "Cache hit");
                return Ok(path);
            }
            Some(digest) => {
                let actual = file_digest(&path, digest.algorithm)?;
                if digest.matches(&actual) {
                    debug!(path = %path.display(), algorithm = %digest.algorithm, "Cache hit, digest verified");
                    return Ok(path);
                }

                warn!(
                    path = %path.display(),
                    expected = %digest.hex,
                    actual = %actual,
                    "Cached file failed digest check, downloading again"
                );
                fs::remove_file(&path)
                    .map_err(|e| DatasetError::io(format!("removing {}", path.display()), e))?;
            }
        }
    }

    let parent = path.parent().unwrap_or(cache_dir);
    fs::create_dir_all(parent)
        .map_err(|e| DatasetError::io(format!("creating {}", parent.display()), e))?;

    let mut temp = NamedTempFile::new_in(parent)
        .map_err(|e| DatasetError::io(format!("creating temporary file in {}", parent.display()), e))?;

    info!(url = %resource.url, path = %path.display(), "Downloading");
    let written = {
        let mut writer = BufWriter::new(temp.as_file_mut());
        let written = transport.fetch(&resource.url, &mut writer)?;
        writer
            .flush()
            .map_err(|e| DatasetError::io(format!("writing {}", path.display()), e))?;
        written
    };

    if let Some(digest) = &resource.digest {
        let mut downloaded = BufReader::new(
            temp.reopen()
                .map_err(|e| DatasetError::io("reopening downloaded file", e))?,
        );
        let actual = hash_reader(&mut downloaded, digest.algorithm)
            .map_err(|e| DatasetError::io("hashing downloaded file", e))?;

        if !digest.matches(&actual) {
            // `temp` is removed on drop, so nothing is left at `path`.
            return Err(DatasetError::Integrity {
                path,
                algorithm: digest.algorithm,
                expected: digest.hex.clone(),
                actual,
            });
        }
    }

    temp.persist(&path)
        .map_err(|e| DatasetError::io(format!("moving download to {}", path.display()), e.error))?;
    info!(path = %path.display(), bytes = written, "Download complete");

    Ok(path)
}
