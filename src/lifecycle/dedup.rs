//! Duplicate detection over processed knowledge records.
//!
//! A record's fingerprint covers its title and a bounded prefix of its
//! content, so two long documents that only differ past the prefix are
//! reported as duplicates.

use std::collections::HashMap;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{DedupConfig, DigestAlgorithm, OriginalSelection};
use crate::error::{Error, Result};
use crate::lifecycle::sweep::Sweeper;
use crate::lifecycle::{DedupOutcome, DuplicateScan};
use crate::storage::{folder_prefix, ObjectMeta};

/// A record whose fingerprint matches an earlier one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicatePair {
    pub original_path: String,
    pub duplicate_path: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct KnowledgeRecord {
    title: String,
    content: String,
}

impl DigestAlgorithm {
    fn hex_digest(self, parts: &[&[u8]]) -> String {
        match self {
            DigestAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                for part in parts {
                    hasher.update(part);
                }
                hasher.finalize().to_hex().to_string()
            }
            DigestAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                format!("{:x}", hasher.finalize())
            }
        }
    }
}

/// Fingerprint of a record: title, a NUL separator, then the first
/// `prefix_chars` characters of content.
pub fn content_digest(title: &str, content: &str, prefix_chars: usize, algorithm: DigestAlgorithm) -> String {
    let cut = content
        .char_indices()
        .nth(prefix_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(content.len());
    algorithm.hex_digest(&[title.as_bytes(), b"\0", content[..cut].as_bytes()])
}

/// Order in which records are scanned. The first record of each
/// fingerprint in this order is the original.
fn scan_order(records: &mut [ObjectMeta], selection: OriginalSelection) {
    match selection {
        OriginalSelection::LexicographicPath => records.sort_by(|a, b| a.path.cmp(&b.path)),
        OriginalSelection::EarliestModified => records.sort_by(|a, b| {
            // Unknown times sort after known ones.
            match (a.last_modified, b.last_modified) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then_with(|| a.path.cmp(&b.path))
        }),
    }
}

pub struct DuplicateDetector<'a> {
    sweeper: &'a Sweeper,
    folder: &'a str,
    config: &'a DedupConfig,
}

impl<'a> DuplicateDetector<'a> {
    pub fn new(sweeper: &'a Sweeper, folder: &'a str, config: &'a DedupConfig) -> Self {
        Self {
            sweeper,
            folder,
            config,
        }
    }

    /// Find duplicate records. Unreadable or malformed records are skipped
    /// and never paired with anything.
    pub async fn scan(&self) -> Result<DuplicateScan> {
        let prefix = folder_prefix(self.folder);
        let mut records: Vec<ObjectMeta> = self
            .sweeper
            .list(&prefix)
            .await
            .map_err(|err| Error::Inventory(format!("listing {prefix}: {err}")))?
            .into_iter()
            .filter(|meta| meta.extension() == "json")
            .collect();
        scan_order(&mut records, self.config.original);

        let paths: Vec<String> = records.into_iter().map(|meta| meta.path).collect();
        let mut scan = DuplicateScan::default();
        let mut originals: HashMap<String, String> = HashMap::new();

        self.sweeper
            .for_each_fetched(paths, "dedup", |path, fetched| {
                let bytes = match fetched {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!("dedup: skipping {path}, read failed: {err}");
                        scan.skipped += 1;
                        return Ok(());
                    }
                };
                let record: KnowledgeRecord = match serde_json::from_slice(&bytes) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!("dedup: skipping {path}, not a knowledge record: {err}");
                        scan.skipped += 1;
                        return Ok(());
                    }
                };

                scan.scanned += 1;
                let digest = content_digest(
                    &record.title,
                    &record.content,
                    self.config.prefix_chars,
                    self.config.algorithm,
                );
                match originals.get(&digest) {
                    Some(original) => scan.pairs.push(DuplicatePair {
                        original_path: original.clone(),
                        duplicate_path: path,
                        title: record.title,
                    }),
                    None => {
                        originals.insert(digest, path);
                    }
                }
                Ok(())
            })
            .await?;

        info!(
            "dedup: scanned {} records, {} duplicates, {} skipped",
            scan.scanned,
            scan.pairs.len(),
            scan.skipped
        );
        Ok(scan)
    }

    /// Scan, then delete every duplicate. Originals are never touched.
    pub async fn remove(&self) -> Result<DedupOutcome> {
        let scan = self.scan().await?;
        let mut outcome = DedupOutcome::default();

        for pair in &scan.pairs {
            if self.sweeper.is_cancelled() {
                warn!("dedup: shutdown requested, stopping removal");
                outcome.interrupted = true;
                break;
            }
            match self.sweeper.delete(&pair.duplicate_path).await {
                Ok(()) => outcome.removed += 1,
                Err(err) => {
                    warn!("dedup: failed to remove {}: {err}", pair.duplicate_path);
                    outcome.record_error(format!("{}: {err}", pair.duplicate_path));
                }
            }
        }
        outcome.pairs = scan.pairs;

        info!("dedup: {}", outcome.summary());
        Ok(outcome)
    }
}
