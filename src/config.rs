//! Engine configuration.
//!
//! Defines the folder layout of the knowledge store, duplicate detection
//! and bundle settings, and the limits applied to every store call.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::lifecycle::RetentionPolicy;
use crate::storage::folder_prefix;

/// Configuration for the lifecycle engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Logical folders of the store.
    pub layout: FolderLayout,

    /// Retention thresholds the CLI uses when none are given on the
    /// command line. Engine operations always take the policy explicitly.
    /// Default: archive after 30 days, delete after 90
    pub retention: RetentionPolicy,

    /// Duplicate detection settings.
    pub dedup: DedupConfig,

    /// Bundle compression settings.
    pub bundle: BundleConfig,

    /// Timeout applied to each individual store call, in milliseconds.
    /// Default: 30 s
    pub store_timeout_ms: u64,

    /// Number of concurrent downloads while building bundles or digesting
    /// records. 1 means strictly sequential.
    /// Default: 1
    pub parallel_workers: usize,

    /// Lifetime of the sweep lease. A lease older than this is considered
    /// abandoned and may be taken over.
    /// Default: 1 hour
    pub lease_ttl_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            layout: FolderLayout::default(),
            retention: RetentionPolicy::default(),
            dedup: DedupConfig::default(),
            bundle: BundleConfig::default(),
            store_timeout_ms: 30_000,
            parallel_workers: 1,
            lease_ttl_secs: 60 * 60,
        }
    }
}

impl LifecycleConfig {
    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.layout.validate()?;
        self.retention.validate()?;
        if self.parallel_workers == 0 {
            return Err(Error::Config("parallel_workers must be at least 1".to_string()));
        }
        if self.store_timeout_ms == 0 {
            return Err(Error::Config("store_timeout_ms must be positive".to_string()));
        }
        if self.dedup.prefix_chars == 0 {
            return Err(Error::Config("dedup.prefix_chars must be positive".to_string()));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

/// Logical folder layout of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FolderLayout {
    /// Hot-tier folders holding source and processed knowledge.
    /// Default: raw, processed, uploads
    pub corpus_folders: Vec<String>,

    /// Folder of processed JSON records scanned for duplicates.
    /// Default: processed
    pub processed_folder: String,

    /// Folder receiving archive bundles.
    /// Default: archive
    pub archive_folder: String,

    /// Folder receiving full-corpus export bundles.
    /// Default: exports
    pub export_folder: String,

    /// Object used as the single-sweep lease.
    /// Default: locks/lifecycle.lease
    pub lease_path: String,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            corpus_folders: vec![
                "raw".to_string(),
                "processed".to_string(),
                "uploads".to_string(),
            ],
            processed_folder: "processed".to_string(),
            archive_folder: "archive".to_string(),
            export_folder: "exports".to_string(),
            lease_path: "locks/lifecycle.lease".to_string(),
        }
    }
}

impl FolderLayout {
    fn validate(&self) -> Result<()> {
        if self.corpus_folders.is_empty() {
            return Err(Error::Config("at least one corpus folder is required".to_string()));
        }
        let lease_path = self.lease_path.trim_start_matches('/');
        for folder in &self.corpus_folders {
            let name = folder.trim_matches('/');
            if name.is_empty() {
                return Err(Error::Config("corpus folder names must not be empty".to_string()));
            }
            if name == self.archive_folder.trim_matches('/')
                || name == self.export_folder.trim_matches('/')
            {
                return Err(Error::Config(format!(
                    "corpus folder {name} overlaps the archive or export folder"
                )));
            }
            if lease_path.starts_with(&folder_prefix(name)) {
                return Err(Error::Config(format!(
                    "lease path {} lies inside corpus folder {name}",
                    self.lease_path
                )));
            }
        }
        if self.archive_folder.trim_matches('/').is_empty()
            || self.export_folder.trim_matches('/').is_empty()
        {
            return Err(Error::Config("archive and export folders must be named".to_string()));
        }
        Ok(())
    }
}

/// Hash used to fingerprint record content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

/// Which copy of a duplicated record is kept as the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OriginalSelection {
    /// Lowest path in lexicographic order.
    #[default]
    LexicographicPath,
    /// Oldest `last_modified`, ties and unknown times broken by path.
    EarliestModified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Number of content characters folded into the digest.
    /// Default: 1000
    pub prefix_chars: usize,

    /// Default: blake3
    pub algorithm: DigestAlgorithm,

    /// Default: lexicographic_path
    pub original: OriginalSelection,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            prefix_chars: 1000,
            algorithm: DigestAlgorithm::default(),
            original: OriginalSelection::default(),
        }
    }
}

/// Compression method for bundle entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BundleCompression {
    Stored,
    #[default]
    Deflated,
    Zstd,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Default: deflated
    pub compression: BundleCompression,

    /// Compression level, method specific. `None` uses the method default.
    pub level: Option<i32>,
}
