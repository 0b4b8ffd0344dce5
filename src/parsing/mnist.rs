//! The MNIST handwritten digit dataset.
//!
//! Four gzip-compressed IDX files, fetched into a local cache and decoded
//! into a train/test [`DatasetSplit`].

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use tracing::info;

use super::decode::{decode_images, decode_labels, NUM_CLASSES};
use super::idx::{IdxHeader, IdxLayout, IdxReader};
use super::{gz, Dataset, DatasetSplit, Geometry};
use crate::config::Config;
use crate::error::{DatasetError, FormatError, Result};
use crate::fetch::{self, HttpTransport, RemoteResource, Transport};

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte.gz";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte.gz";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte.gz";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte.gz";

const LOCAL_PREFIX: &str = "mnist";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Images,
    Labels,
}

impl Role {
    pub fn layout(self) -> IdxLayout {
        match self {
            Role::Images => IdxLayout::IMAGES,
            Role::Labels => IdxLayout::LABELS,
        }
    }
}

/// One of the four files making up the dataset.
#[derive(Clone, Copy, Debug)]
pub struct ResourceSpec {
    pub file_name: &'static str,
    pub split: Split,
    pub role: Role,
}

pub const RESOURCES: [ResourceSpec; 4] = [
    ResourceSpec {
        file_name: TRAIN_IMAGES,
        split: Split::Train,
        role: Role::Images,
    },
    ResourceSpec {
        file_name: TRAIN_LABELS,
        split: Split::Train,
        role: Role::Labels,
    },
    ResourceSpec {
        file_name: TEST_IMAGES,
        split: Split::Test,
        role: Role::Images,
    },
    ResourceSpec {
        file_name: TEST_LABELS,
        split: Split::Test,
        role: Role::Labels,
    },
];

fn resource_spec(split: Split, role: Role) -> &'static ResourceSpec {
    match (split, role) {
        (Split::Train, Role::Images) => &RESOURCES[0],
        (Split::Train, Role::Labels) => &RESOURCES[1],
        (Split::Test, Role::Images) => &RESOURCES[2],
        (Split::Test, Role::Labels) => &RESOURCES[3],
    }
}

/// Join a base URL and a file name with exactly one `/` between them.
pub fn join_url(base: &str, file_name: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        file_name.trim_start_matches('/')
    )
}

/// Cache location, origin and configured digest of one dataset file.
pub fn remote_resource(config: &Config, spec: &ResourceSpec) -> RemoteResource {
    RemoteResource {
        relative_path: Path::new(LOCAL_PREFIX).join(spec.file_name),
        url: join_url(&config.base_url, spec.file_name),
        digest: config.digests.get(spec.file_name).cloned(),
    }
}

type IdxFile = IdxReader<GzDecoder<BufReader<File>>>;

pub struct MnistLoader<T> {
    config: Config,
    transport: T,
}

impl MnistLoader<HttpTransport> {
    pub fn from_config(config: Config) -> Result<MnistLoader<HttpTransport>> {
        let transport = HttpTransport::new(Duration::from_secs(config.timeout_secs))?;
        MnistLoader::new(config, transport)
    }
}

impl<T: Transport> MnistLoader<T> {
    pub fn new(config: Config, transport: T) -> Result<MnistLoader<T>> {
        config.validate()?;
        Ok(MnistLoader { config, transport })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Make sure all four files are cached and verified.
    pub fn fetch_all(&self) -> Result<Vec<PathBuf>> {
        RESOURCES.iter().map(|spec| self.fetch(spec)).collect()
    }

    fn fetch(&self, spec: &ResourceSpec) -> Result<PathBuf> {
        let resource = remote_resource(&self.config, spec);
        fetch::ensure(&self.config.cache_dir, &resource, &self.transport)
    }

    fn open(&self, split: Split, role: Role) -> Result<(IdxFile, IdxHeader)> {
        let path = self.fetch(resource_spec(split, role))?;
        let mut reader = IdxReader::new(path.display().to_string(), gz::open(&path)?);
        let header = reader.read_header(role.layout())?;

        Ok((reader, header))
    }

    /// Load one split. Both headers are read and their record counts
    /// compared before any record is decoded.
    pub fn load(&self, split: Split) -> Result<(Dataset, Geometry)> {
        let (images, image_header) = self.open(split, Role::Images)?;
        let (labels, label_header) = self.open(split, Role::Labels)?;

        if image_header.count != label_header.count {
            return Err(DatasetError::Misaligned {
                split: split.to_string(),
                images: image_header.count,
                labels: label_header.count,
            });
        }

        let geometry = match image_header.shape[..] {
            [rows, cols] => Geometry {
                rows,
                cols,
                classes: NUM_CLASSES,
            },
            _ => {
                return Err(DatasetError::format(
                    images.name().to_string(),
                    FormatError::TruncatedHeader,
                ))
            }
        };

        let data = decode_images(images, &image_header)?;
        let target = decode_labels(labels, &label_header)?;
        let dataset = Dataset::named(&split.to_string(), data, target)?;

        info!(%split, samples = dataset.len(), rows = geometry.rows, cols = geometry.cols, "Split loaded");
        Ok((dataset, geometry))
    }

    /// Load the training and test splits.
    pub fn load_split(&self) -> Result<DatasetSplit> {
        let (train, geometry) = self.load(Split::Train)?;
        let (test, test_geometry) = self.load(Split::Test)?;

        if test_geometry != geometry {
            return Err(DatasetError::format(
                TEST_IMAGES,
                FormatError::GeometryMismatch {
                    expected_rows: geometry.rows,
                    expected_cols: geometry.cols,
                    rows: test_geometry.rows,
                    cols: test_geometry.cols,
                },
            ));
        }

        Ok(DatasetSplit {
            train,
            test,
            geometry,
        })
    }
}

/// Load MNIST from `cache_dir`, downloading missing files from the default
/// mirror and verifying the default digests.
pub fn load_split(cache_dir: &Path) -> Result<DatasetSplit> {
    let config = Config {
        cache_dir: cache_dir.to_path_buf(),
        ..Config::default()
    };

    MnistLoader::from_config(config)?.load_split()
}
