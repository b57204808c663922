//! Hot tier -> archive bundle transitions.
//!
//! Sources are only removed after the bundle holding them is uploaded and
//! the store reports it at the expected size. A failed upload leaves every
//! source in place.

use std::collections::HashMap;

use log::{info, warn};
use time::OffsetDateTime;

use crate::config::{BundleConfig, FolderLayout};
use crate::error::{Error, Result};
use crate::lifecycle::bundle::{unique_bundle_path, BundleKind, BundleWriter, FinishedBundle};
use crate::lifecycle::sweep::Sweeper;
use crate::lifecycle::{
    classify, ArchiveOutcome, DeleteOutcome, InventoryCollector, RetentionPolicy, StorageObject,
};
use crate::storage::ZIP_CONTENT_TYPE;

pub struct ArchivePackager<'a> {
    sweeper: &'a Sweeper,
    layout: &'a FolderLayout,
    bundle: &'a BundleConfig,
}

impl<'a> ArchivePackager<'a> {
    pub fn new(sweeper: &'a Sweeper, layout: &'a FolderLayout, bundle: &'a BundleConfig) -> Self {
        Self {
            sweeper,
            layout,
            bundle,
        }
    }

    /// Bundle every archivable object, upload the bundle, then remove the
    /// bundled objects from the hot tier.
    pub async fn archive(&self, policy: &RetentionPolicy, now: OffsetDateTime) -> Result<ArchiveOutcome> {
        policy.validate()?;
        let inventory = InventoryCollector::new(self.sweeper, &self.layout.corpus_folders)
            .collect(policy.archive_threshold_days, now)
            .await?;
        let plan = classify(&inventory, policy)?;

        let mut outcome = ArchiveOutcome::default();
        if plan.archivable.is_empty() {
            info!("archive: nothing to archive");
            return Ok(outcome);
        }

        let selected: HashMap<&str, &StorageObject> = plan
            .archivable
            .iter()
            .map(|object| (object.path.as_str(), object))
            .collect();
        let paths: Vec<String> = plan.archivable.iter().map(|o| o.path.clone()).collect();

        let mut writer = BundleWriter::new(self.bundle);
        self.sweeper
            .for_each_fetched(paths, "archive", |path, fetched| {
                match fetched {
                    Ok(bytes) => {
                        let modified = selected.get(path.as_str()).and_then(|o| o.last_modified);
                        writer.add(&path, &bytes, modified)?;
                    }
                    Err(err) => {
                        warn!("archive: leaving {path} in place, download failed: {err}");
                        outcome.record_download_failure(format!("{path}: {err}"));
                    }
                }
                Ok(())
            })
            .await?;

        if writer.is_empty() {
            warn!(
                "archive: all {} selected objects failed to download, no bundle written",
                outcome.download_failures
            );
            return Ok(outcome);
        }

        let bundle = writer.finish()?;
        self.sweeper.check("archive")?;
        let (archive_path, size) =
            upload_bundle(self.sweeper, &self.layout.archive_folder, BundleKind::Archive, now, &bundle).await?;

        outcome.archived = bundle.entries.len();
        outcome.archive_path = Some(archive_path.clone());
        outcome.archive_size_bytes = size;
        outcome.contained_paths = bundle.entries.clone();

        for path in &bundle.entries {
            if self.sweeper.is_cancelled() {
                warn!("archive: shutdown requested, leaving remaining archived objects in place");
                outcome.interrupted = true;
                break;
            }
            match self.sweeper.delete(path).await {
                Ok(()) => outcome.deleted += 1,
                Err(err) => {
                    warn!("archive: {path} is archived in {archive_path} but delete failed: {err}");
                    outcome.record_delete_failure(format!("{path}: {err}"));
                }
            }
        }

        info!("archive: {}", outcome.summary());
        Ok(outcome)
    }

    /// Delete every hot-tier object at least `days_threshold` days old.
    pub async fn delete_older_than(&self, days_threshold: u32, now: OffsetDateTime) -> Result<DeleteOutcome> {
        if days_threshold == 0 {
            return Err(Error::Policy("deletion threshold must be positive".to_string()));
        }
        let inventory = InventoryCollector::new(self.sweeper, &self.layout.corpus_folders)
            .collect(days_threshold, now)
            .await?;

        let mut outcome = DeleteOutcome::default();
        let threshold = i64::from(days_threshold);
        for object in inventory.objects.iter().filter(|o| o.age_days >= threshold) {
            if self.sweeper.is_cancelled() {
                warn!("delete: shutdown requested, stopping sweep");
                outcome.interrupted = true;
                break;
            }
            match self.sweeper.delete(&object.path).await {
                Ok(()) => outcome.record_deletion(object.size_bytes),
                Err(err) => {
                    warn!("delete: failed to remove {}: {err}", object.path);
                    outcome.record_error(format!("{}: {err}", object.path));
                }
            }
        }

        info!("delete: {}", outcome.summary());
        Ok(outcome)
    }
}

/// Upload a finished bundle under a fresh date-stamped name and confirm
/// the store holds it at full size. Returns the path and size.
pub(crate) async fn upload_bundle(
    sweeper: &Sweeper,
    folder: &str,
    kind: BundleKind,
    now: OffsetDateTime,
    bundle: &FinishedBundle,
) -> Result<(String, u64)> {
    let path = unique_bundle_path(sweeper, folder, kind, now).await?;
    let size = bundle.bytes.len() as u64;

    sweeper
        .put(&path, bundle.bytes.clone(), ZIP_CONTENT_TYPE)
        .await
        .map_err(|err| Error::Upload {
            path: path.clone(),
            reason: err.to_string(),
        })?;

    match sweeper.head(&path).await {
        Ok(Some(meta)) if meta.size_bytes == size => Ok((path, size)),
        Ok(Some(meta)) => Err(Error::Upload {
            reason: format!("stored size {} does not match bundle size {size}", meta.size_bytes),
            path,
        }),
        Ok(None) => Err(Error::Upload {
            reason: "bundle missing after upload".to_string(),
            path,
        }),
        Err(err) => Err(Error::Upload {
            reason: format!("could not verify upload: {err}"),
            path,
        }),
    }
}
