use std::collections::HashMap;

use log::{info, warn};
use time::OffsetDateTime;

use crate::config::{BundleConfig, FolderLayout};
use crate::error::Result;
use crate::lifecycle::bundle::{BundleKind, BundleWriter};
use crate::lifecycle::packager::upload_bundle;
use crate::lifecycle::sweep::Sweeper;
use crate::lifecycle::{ExportOutcome, InventoryCollector};

/// Packs every corpus object into one bundle in the export folder.
/// Nothing is deleted.
pub struct BulkExporter<'a> {
    sweeper: &'a Sweeper,
    layout: &'a FolderLayout,
    bundle: &'a BundleConfig,
}

impl<'a> BulkExporter<'a> {
    pub fn new(sweeper: &'a Sweeper, layout: &'a FolderLayout, bundle: &'a BundleConfig) -> Self {
        Self {
            sweeper,
            layout,
            bundle,
        }
    }

    pub async fn export(&self, now: OffsetDateTime) -> Result<ExportOutcome> {
        // Archive threshold is irrelevant for an export; only the listing is used.
        let inventory = InventoryCollector::new(self.sweeper, &self.layout.corpus_folders)
            .collect(u32::MAX, now)
            .await?;

        let mut outcome = ExportOutcome {
            skipped_folders: inventory.skipped_folders.clone(),
            ..Default::default()
        };
        let paths: Vec<String> = inventory.objects.iter().map(|o| o.path.clone()).collect();
        let modified: HashMap<&str, Option<OffsetDateTime>> = inventory
            .objects
            .iter()
            .map(|o| (o.path.as_str(), o.last_modified))
            .collect();

        let mut writer = BundleWriter::new(self.bundle);
        self.sweeper
            .for_each_fetched(paths, "export", |path, fetched| {
                let stamp = modified.get(path.as_str()).copied().flatten();
                match fetched {
                    Ok(bytes) => writer.add(&path, &bytes, stamp)?,
                    Err(err) => {
                        warn!("export: excluding {path}, read failed: {err}");
                        outcome.record_skip(format!("{path}: {err}"));
                    }
                }
                Ok(())
            })
            .await?;

        let bundle = writer.finish()?;
        self.sweeper.check("export")?;
        let (path, size) =
            upload_bundle(self.sweeper, &self.layout.export_folder, BundleKind::Export, now, &bundle).await?;

        outcome.export_path = path;
        outcome.export_size_bytes = size;
        outcome.included_count = bundle.entries.len();

        info!("export: {}", outcome.summary());
        Ok(outcome)
    }
}
