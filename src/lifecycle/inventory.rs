//! Storage inventory snapshots.

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::Result;
use crate::lifecycle::sweep::Sweeper;
use crate::lifecycle::DuplicatePair;
use crate::storage::{folder_of, folder_prefix, ObjectMeta};

const SECS_PER_DAY: i64 = 86_400;

/// One object found under a corpus folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageObject {
    pub path: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    /// Whole days since `last_modified` (falling back to creation time)
    /// at the moment of the scan. 0 when the store reports neither.
    pub age_days: i64,
}

impl StorageObject {
    pub fn from_meta(meta: &ObjectMeta, now: OffsetDateTime) -> Self {
        Self {
            path: meta.path.clone(),
            size_bytes: meta.size_bytes,
            last_modified: meta.last_modified,
            age_days: age_days(meta, now),
        }
    }

    pub fn folder(&self) -> &str {
        folder_of(&self.path)
    }
}

/// Age in whole days. Future timestamps count as age 0.
pub fn age_days(meta: &ObjectMeta, now: OffsetDateTime) -> i64 {
    meta.last_modified
        .or(meta.created_at)
        .map(|at| ((now - at).whole_seconds() / SECS_PER_DAY).max(0))
        .unwrap_or(0)
}

/// Snapshot of the corpus folders. Rebuilt on every call, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct StorageInventory {
    pub total_files: usize,
    pub total_size_bytes: u64,
    pub count_by_extension: BTreeMap<String, usize>,
    pub count_by_folder: BTreeMap<String, usize>,
    /// Every scanned object, sorted by path.
    pub objects: Vec<StorageObject>,
    /// Objects strictly older than the archive threshold, oldest first.
    pub aged_objects: Vec<StorageObject>,
    pub duplicates: Vec<DuplicatePair>,
    /// Folders whose listing failed and are missing from the counts.
    pub skipped_folders: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub collected_at: OffsetDateTime,
}

impl StorageInventory {
    fn empty(now: OffsetDateTime) -> Self {
        Self {
            total_files: 0,
            total_size_bytes: 0,
            count_by_extension: BTreeMap::new(),
            count_by_folder: BTreeMap::new(),
            objects: Vec::new(),
            aged_objects: Vec::new(),
            duplicates: Vec::new(),
            skipped_folders: Vec::new(),
            collected_at: now,
        }
    }

    fn record(&mut self, folder: &str, meta: &ObjectMeta) {
        let object = StorageObject::from_meta(meta, self.collected_at);
        self.total_files += 1;
        self.total_size_bytes += object.size_bytes;
        *self.count_by_folder.entry(folder.to_string()).or_default() += 1;
        *self.count_by_extension.entry(meta.extension()).or_default() += 1;
        self.objects.push(object);
    }
}

/// Walks the configured corpus folders. Performs reads only.
pub struct InventoryCollector<'a> {
    sweeper: &'a Sweeper,
    folders: &'a [String],
}

impl<'a> InventoryCollector<'a> {
    pub fn new(sweeper: &'a Sweeper, folders: &'a [String]) -> Self {
        Self { sweeper, folders }
    }

    /// Build an inventory as of `now`. A folder whose listing fails is
    /// skipped with a warning; only cancellation fails the collection.
    pub async fn collect(&self, archive_threshold_days: u32, now: OffsetDateTime) -> Result<StorageInventory> {
        let mut inventory = StorageInventory::empty(now);

        for folder in self.folders {
            self.sweeper.check("inventory")?;
            let name = folder.trim_matches('/');
            let listed = match self.sweeper.list(&folder_prefix(name)).await {
                Ok(listed) => listed,
                Err(err) => {
                    warn!("inventory: skipping folder {name}: {err}");
                    inventory.skipped_folders.push(name.to_string());
                    continue;
                }
            };

            inventory.count_by_folder.entry(name.to_string()).or_default();
            for meta in &listed {
                inventory.record(name, meta);
            }
        }

        inventory.objects.sort_by(|a, b| a.path.cmp(&b.path));
        let threshold = i64::from(archive_threshold_days);
        inventory.aged_objects = inventory
            .objects
            .iter()
            .filter(|o| o.age_days > threshold)
            .cloned()
            .collect();
        inventory
            .aged_objects
            .sort_by(|a, b| b.age_days.cmp(&a.age_days).then_with(|| a.path.cmp(&b.path)));

        info!(
            "inventory: {} files, {} bytes across {} folders ({} aged, {} skipped folders)",
            inventory.total_files,
            inventory.total_size_bytes,
            inventory.count_by_folder.len(),
            inventory.aged_objects.len(),
            inventory.skipped_folders.len()
        );
        Ok(inventory)
    }
}
