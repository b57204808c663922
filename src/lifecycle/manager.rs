//! Knowledge store lifecycle manager.

use std::sync::Arc;

use log::warn;
use time::OffsetDateTime;

use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::lifecycle::sweep::{Shutdown, SweepLease, Sweeper};
use crate::lifecycle::{
    ArchiveBundleMeta, ArchiveCatalog, ArchiveOutcome, ArchivePackager, BulkExporter,
    DedupOutcome, DeleteOutcome, DuplicateDetector, DuplicateScan, ExportOutcome,
    InventoryCollector, RetentionPolicy, StorageInventory,
};
use crate::storage::ObjectStore;

/// Entry point for every lifecycle operation.
///
/// Operations are independent and safe to re-run. The ones that delete
/// objects hold the sweep lease for their whole run.
pub struct LifecycleManager {
    /// Store handle with timeouts, workers and cancellation applied.
    sweeper: Sweeper,

    /// Engine configuration.
    config: LifecycleConfig,
}

impl LifecycleManager {
    /// Create a manager over `store`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid.
    pub fn new(store: Arc<dyn ObjectStore>, config: LifecycleConfig) -> Result<Self> {
        Self::with_shutdown(store, config, Shutdown::new())
    }

    /// Create a manager that stops at the next object boundary once
    /// `shutdown` is triggered.
    pub fn with_shutdown(store: Arc<dyn ObjectStore>, config: LifecycleConfig, shutdown: Shutdown) -> Result<Self> {
        config.validate()?;
        let sweeper = Sweeper::new(store, config.store_timeout(), config.parallel_workers, shutdown);
        Ok(Self { sweeper, config })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn shutdown(&self) -> Shutdown {
        self.sweeper.shutdown().clone()
    }

    /// Inventory of the corpus folders, with objects older than the
    /// policy's archive threshold and detected duplicates.
    pub async fn get_storage_stats(&self, policy: &RetentionPolicy) -> Result<StorageInventory> {
        policy.validate()?;
        let mut inventory = InventoryCollector::new(&self.sweeper, &self.config.layout.corpus_folders)
            .collect(policy.archive_threshold_days, OffsetDateTime::now_utc())
            .await?;

        match self.find_duplicates().await {
            Ok(scan) => inventory.duplicates = scan.pairs,
            Err(err) => warn!("stats: duplicate scan failed: {err}"),
        }
        Ok(inventory)
    }

    pub async fn archive_old_data(&self, policy: &RetentionPolicy) -> Result<ArchiveOutcome> {
        policy.validate()?;
        let lease = self.acquire_lease("archive").await?;
        let result = ArchivePackager::new(&self.sweeper, &self.config.layout, &self.config.bundle)
            .archive(policy, OffsetDateTime::now_utc())
            .await;
        self.sweeper.release_lease(lease).await;
        result
    }

    pub async fn delete_old_data(&self, days_threshold: u32) -> Result<DeleteOutcome> {
        let lease = self.acquire_lease("delete").await?;
        let result = ArchivePackager::new(&self.sweeper, &self.config.layout, &self.config.bundle)
            .delete_older_than(days_threshold, OffsetDateTime::now_utc())
            .await;
        self.sweeper.release_lease(lease).await;
        result
    }

    pub async fn find_duplicates(&self) -> Result<DuplicateScan> {
        self.detector().scan().await
    }

    pub async fn remove_duplicates(&self) -> Result<DedupOutcome> {
        let lease = self.acquire_lease("dedup").await?;
        let result = self.detector().remove().await;
        self.sweeper.release_lease(lease).await;
        result
    }

    pub async fn export_all_data(&self) -> Result<ExportOutcome> {
        BulkExporter::new(&self.sweeper, &self.config.layout, &self.config.bundle)
            .export(OffsetDateTime::now_utc())
            .await
    }

    pub async fn list_archives(&self) -> Result<Vec<ArchiveBundleMeta>> {
        ArchiveCatalog::new(&self.sweeper, &self.config.layout.archive_folder)
            .list()
            .await
    }

    /// Raw bytes of a stored bundle, for inspecting its contents.
    pub async fn read_bundle(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.sweeper.get(path).await?)
    }

    fn detector(&self) -> DuplicateDetector<'_> {
        DuplicateDetector::new(
            &self.sweeper,
            &self.config.layout.processed_folder,
            &self.config.dedup,
        )
    }

    async fn acquire_lease(&self, operation: &str) -> Result<SweepLease> {
        self.sweeper
            .acquire_lease(&self.config.layout.lease_path, self.config.lease_ttl(), operation)
            .await
    }
}
