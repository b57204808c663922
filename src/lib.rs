//! Lifecycle and archival engine for knowledge-base object stores.
//!
//! Inventories the corpus folders of a store, classifies objects into
//! retention tiers, packs aged objects into ZIP bundles, removes duplicate
//! records and exports the whole corpus. Every operation is a standalone
//! sweep that is safe to re-run.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod storage;

pub use config::LifecycleConfig;
pub use error::{Error, Result};
pub use lifecycle::{LifecycleManager, RetentionPolicy, Shutdown};
pub use storage::{LocalStore, MemoryStore, ObjectStore};
