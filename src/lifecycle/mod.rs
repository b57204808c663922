//! Knowledge store lifecycle management.
//!
//! This module provides the lifecycle operations over a knowledge store:
//! - Inventory of the corpus folders with age buckets
//! - Retention classification (fresh / archivable / deletable)
//! - Archival of aged objects into ZIP bundles, upload before delete
//! - Duplicate detection over processed records
//! - Full-corpus export and a catalog of produced bundles
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kb_lifecycle::config::LifecycleConfig;
//! use kb_lifecycle::lifecycle::{LifecycleManager, RetentionPolicy};
//! use kb_lifecycle::storage::LocalStore;
//!
//! let store = Arc::new(LocalStore::new("./knowledge"));
//! let manager = LifecycleManager::new(store, LifecycleConfig::default())?;
//!
//! let policy = RetentionPolicy::new(30, 90)?;
//! let outcome = manager.archive_old_data(&policy).await?;
//! println!("{}", outcome.summary());
//! ```

pub mod bundle;
mod catalog;
mod dedup;
mod export;
mod inventory;
mod manager;
mod packager;
mod policy;
mod stats;
pub mod sweep;

pub use bundle::{read_bundle_entries, read_bundle_entry, BundleKind};
pub use catalog::{ArchiveBundleMeta, ArchiveCatalog};
pub use dedup::{content_digest, DuplicateDetector, DuplicatePair};
pub use export::BulkExporter;
pub use inventory::{age_days, InventoryCollector, StorageInventory, StorageObject};
pub use manager::LifecycleManager;
pub use packager::ArchivePackager;
pub use policy::{classify, RetentionPlan, RetentionPolicy, RetentionTier};
pub use stats::{ArchiveOutcome, DedupOutcome, DeleteOutcome, DuplicateScan, ExportOutcome};
pub use sweep::Shutdown;
