//! Ingestion of the MNIST handwritten digit dataset.
//!
//! The four gzip-compressed IDX files are fetched into a local cache
//! (optionally verified against a digest), decompressed, parsed and turned
//! into normalized pixel matrices and one-hot label matrices.
//!
//! ```no_run
//! let split = mnist_idx::load_split(std::path::Path::new("datasets"))?;
//! assert_eq!(split.geometry.features(), 784);
//! # Ok::<(), mnist_idx::DatasetError>(())
//! ```

pub mod activations;
pub mod config;
pub mod error;
pub mod fetch;
pub mod parsing;

pub use config::Config;
pub use error::{DatasetError, FormatError, Result};
pub use parsing::mnist::{load_split, MnistLoader, Split};
pub use parsing::{Dataset, DatasetSplit, Geometry};
