use thiserror::Error;

use crate::storage::StoreError;

/// Operation-level failures. Per-object failures never surface here; they
/// are counted in the outcome of the sweep that hit them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid retention policy: {0}")]
    Policy(String),
    #[error("inventory failed: {0}")]
    Inventory(String),
    #[error("packaging failed: {0}")]
    Packaging(String),
    #[error("upload of {path} failed: {reason}")]
    Upload { path: String, reason: String },
    #[error("deletion failed: {0}")]
    Deletion(String),
    #[error("archive catalog lookup failed: {0}")]
    Catalog(#[source] StoreError),
    #[error("another sweep holds the lease {path} (owner {owner})")]
    SweepInProgress { path: String, owner: String },
    #[error("{stage} cancelled before completion")]
    Cancelled { stage: &'static str },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<zip::result::ZipError> for Error {
    fn from(value: zip::result::ZipError) -> Self {
        Error::Packaging(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
