//! Object store abstraction the lifecycle engine runs against.
//!
//! The engine only needs five calls from a store: `list`, `head`, `get`,
//! `put` and `delete`. Listings are not assumed to be strongly consistent
//! or stably ordered; callers sort whatever they get back.

mod local;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

pub use local::LocalStore;
pub use memory::{MemoryStore, StoreCall, StoreOp};

pub const ZIP_CONTENT_TYPE: &str = "application/zip";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("{op} {path} timed out after {after:?}")]
    Timeout {
        op: &'static str,
        path: String,
        after: Duration,
    },
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Listing metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub path: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

impl ObjectMeta {
    /// Last path component, used as the display name of bundles.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Extension without the dot, lowercased. Empty when there is none.
    pub fn extension(&self) -> String {
        match self.name().rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
            _ => String::new(),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose path starts with `prefix`.
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>>;

    /// Metadata for one object, `None` if it does not exist.
    async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>>;

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>>;

    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()>;

    /// Delete-if-exists: removing a missing object is not an error.
    async fn delete(&self, path: &str) -> StoreResult<()>;
}

/// Listing prefix for a logical folder (`"processed"` -> `"processed/"`).
pub fn folder_prefix(folder: &str) -> String {
    let trimmed = folder.trim_matches('/');
    format!("{trimmed}/")
}

/// Join a folder and an object name into a logical path.
pub fn join_path(folder: &str, name: &str) -> String {
    format!("{}{}", folder_prefix(folder), name.trim_start_matches('/'))
}

/// Logical folder of a path: its first component.
pub fn folder_of(path: &str) -> &str {
    path.split_once('/').map(|(folder, _)| folder).unwrap_or("")
}
