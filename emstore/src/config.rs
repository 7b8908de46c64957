//! Configuration for building an embedding store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EmstoreError, Result};

/// Default number of records per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Configuration for a single store build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Embedding text, plain or zip-compressed.
    pub source_path: PathBuf,

    /// Directory the store is created in.
    pub destination_path: PathBuf,

    /// Vector size; inferred from the source when absent.
    pub vector_size: Option<usize>,

    /// Archive member to read when the archive holds several files.
    pub archive_member: Option<String>,

    /// Replace an existing store at the destination.
    pub overwrite: bool,

    /// Records per committed batch.
    pub batch_size: usize,

    /// Store page granularity in bytes.
    pub block_size: usize,

    /// Hot-page cache capacity in bytes (0 disables the cache).
    pub cache_size: usize,

    /// Bloom filter bits per key (0 disables the filter).
    pub filter_bits: u32,

    /// What to do with lines that fail to parse.
    pub malformed_policy: MalformedPolicy,

    /// Number of input lines, when known, for progress reporting.
    pub expected_records: Option<u64>,

    /// Records between progress reports.
    pub progress_interval: u64,
}

impl BuildConfig {
    /// Create a configuration with default tuning.
    pub fn new(source_path: impl Into<PathBuf>, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Set the vector size instead of inferring it.
    pub fn with_vector_size(mut self, vector_size: usize) -> Self {
        self.vector_size = Some(vector_size);
        self
    }

    /// Select the archive member to read.
    pub fn with_archive_member(mut self, member: impl Into<String>) -> Self {
        self.archive_member = Some(member.into());
        self
    }

    /// Replace any store already at the destination.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the malformed-record policy.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    /// Set the expected record count for progress reporting.
    pub fn with_expected_records(mut self, expected: u64) -> Self {
        self.expected_records = Some(expected);
        self
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.source_path.as_os_str().is_empty() {
            return Err(EmstoreError::Config("source_path is required".to_string()));
        }
        if self.destination_path.as_os_str().is_empty() {
            return Err(EmstoreError::Config(
                "destination_path is required".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(EmstoreError::Config(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.vector_size == Some(0) {
            return Err(EmstoreError::Config(
                "vector_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Store options for this build.
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            block_size: self.block_size,
            cache_size: self.cache_size,
            filter_bits: self.filter_bits,
            create_if_missing: true,
            error_if_exists: !self.overwrite,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        let store = StoreOptions::default();
        Self {
            source_path: PathBuf::new(),
            destination_path: PathBuf::new(),
            vector_size: None,
            archive_member: None,
            overwrite: false,
            batch_size: DEFAULT_BATCH_SIZE,
            block_size: store.block_size,
            cache_size: store.cache_size,
            filter_bits: store.filter_bits,
            malformed_policy: MalformedPolicy::default(),
            expected_records: None,
            progress_interval: 10_000,
        }
    }
}

/// Tuning passed through to the store when it is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Page granularity in bytes.
    pub block_size: usize,

    /// Block cache capacity in bytes.
    pub cache_size: usize,

    /// Bloom filter bits per key.
    pub filter_bits: u32,

    /// Create the store when it does not exist.
    pub create_if_missing: bool,

    /// Fail when a store already exists.
    pub error_if_exists: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            block_size: 65_536,
            cache_size: 200_000,
            filter_bits: 10,
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

/// How lines that fail to parse or encode are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Log the line, count it, and continue.
    #[default]
    Skip,

    /// Stop the build with the record error.
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_from_toml() {
        let config = BuildConfig::from_toml_str(
            r#"
            source_path = "/data/glove.6B.300d.zip"
            destination_path = "/data/glove"
            overwrite = true
            batch_size = 200
            filter_bits = 12
            malformed_policy = "abort"
            "#,
        )
        .unwrap();

        assert_eq!(config.source_path, PathBuf::from("/data/glove.6B.300d.zip"));
        assert_eq!(config.batch_size, 200);
        assert_eq!(config.vector_size, None);
        assert_eq!(config.block_size, 65_536);
        assert_eq!(config.malformed_policy, MalformedPolicy::Abort);

        let options = config.store_options();
        assert_eq!(options.filter_bits, 12);
        assert!(!options.error_if_exists);
    }

    #[test]
    fn test_validation() {
        assert!(BuildConfig::default().validate().is_err());
        assert!(BuildConfig::new("in.txt", "out").validate().is_ok());
        assert!(
            BuildConfig::new("in.txt", "out")
                .with_batch_size(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_existing_store_is_an_error_unless_overwriting() {
        let config = BuildConfig::new("in.txt", "out");
        assert!(config.store_options().error_if_exists);
        assert!(!config.with_overwrite(true).store_options().error_if_exists);
    }
}
