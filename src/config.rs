//! Loader configuration.
//!
//! Every field has a default, so an empty TOML file is a valid config. The
//! `digests` table replaces the default pins wholesale when given.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};
use crate::fetch::Digest;
use crate::parsing::mnist::{RESOURCES, TEST_IMAGES, TEST_LABELS};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base directory; files are cached under `<cache_dir>/mnist/`.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Location the file names are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Expected digest per file name. Files without an entry are not
    /// verified.
    #[serde(default = "default_digests")]
    pub digests: BTreeMap<String, Digest>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("datasets")
}

fn default_base_url() -> String {
    "https://ossci-datasets.s3.amazonaws.com/mnist/".to_string()
}

fn default_timeout() -> u64 {
    300
}

fn default_digests() -> BTreeMap<String, Digest> {
    BTreeMap::from([
        (
            TEST_IMAGES.to_string(),
            Digest::sha256("beb4b4806386107117295b2e3e08b4c16a6dfb4f001bfeb97bf25425ba1e08e4"),
        ),
        (
            TEST_LABELS.to_string(),
            Digest::sha256("986c5b8cbc6074861436f5581f7798be35c7c0025262d33b4df4c9ef668ec773"),
        ),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            digests: default_digests(),
        }
    }
}

impl Config {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)
            .map_err(|e| DatasetError::io(format!("reading config {}", path.display()), e))?;

        Config::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(contents).map_err(|e| DatasetError::Config(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(DatasetError::Config(format!(
                "base_url '{}' is not an http(s) URL",
                self.base_url
            )));
        }

        for (name, digest) in &self.digests {
            if !RESOURCES.iter().any(|r| r.file_name == name.as_str()) {
                return Err(DatasetError::Config(format!(
                    "digest configured for unknown file '{name}'"
                )));
            }
            digest.validate()?;
        }

        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| DatasetError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::DigestAlgorithm;
    use crate::parsing::mnist::{TRAIN_IMAGES, TRAIN_LABELS};

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn only_test_files_are_pinned_by_default() {
        let config = Config::default();

        assert!(config.digests.contains_key(TEST_IMAGES));
        assert!(config.digests.contains_key(TEST_LABELS));
        assert!(!config.digests.contains_key(TRAIN_IMAGES));
        assert!(!config.digests.contains_key(TRAIN_LABELS));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn digest_table_can_pin_any_file() {
        let config = Config::from_toml(
            r#"
cache_dir = "/tmp/data"
base_url = "http://localhost:8000"

[digests."train-labels-idx1-ubyte.gz"]
algorithm = "sha256"
hex = "3552534A0A558BBED6AED32B30C495CCA23D567EC52CAC8BE1A0730E8010255C"
"#,
        )
        .unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/data"));
        assert_eq!(config.digests.len(), 1);
        assert_eq!(
            config.digests[TRAIN_LABELS].algorithm,
            DigestAlgorithm::Sha256
        );
    }

    #[test]
    fn rejects_bad_digest_and_unknown_files() {
        let bad_hex = r#"
[digests."t10k-labels-idx1-ubyte.gz"]
algorithm = "sha256"
hex = "not-hex"
"#;
        let unknown = r#"
[digests."cifar.tar.gz"]
algorithm = "sha256"
hex = "986c5b8cbc6074861436f5581f7798be35c7c0025262d33b4df4c9ef668ec773"
"#;

        assert!(matches!(Config::from_toml(bad_hex), Err(DatasetError::Config(_))));
        assert!(matches!(Config::from_toml(unknown), Err(DatasetError::Config(_))));
        assert!(Config::from_toml("base_url = \"ftp://mirror\"").is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();

        let parsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();

        assert_eq!(parsed, config);
    }
}
