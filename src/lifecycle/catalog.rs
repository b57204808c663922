use std::cmp::Ordering;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::lifecycle::sweep::Sweeper;
use crate::storage::folder_prefix;

/// Listing entry for one bundle in the archive folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveBundleMeta {
    pub name: String,
    pub storage_path: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

pub struct ArchiveCatalog<'a> {
    sweeper: &'a Sweeper,
    folder: &'a str,
}

impl<'a> ArchiveCatalog<'a> {
    pub fn new(sweeper: &'a Sweeper, folder: &'a str) -> Self {
        Self { sweeper, folder }
    }

    /// Bundles in the archive folder, newest first. Bundles without a known
    /// creation time come last. A listing failure is returned as is.
    pub async fn list(&self) -> Result<Vec<ArchiveBundleMeta>> {
        let listed = self
            .sweeper
            .list(&folder_prefix(self.folder))
            .await
            .map_err(Error::Catalog)?;

        let mut bundles: Vec<ArchiveBundleMeta> = listed
            .into_iter()
            .filter(|meta| meta.extension() == "zip")
            .map(|meta| ArchiveBundleMeta {
                name: meta.name().to_string(),
                created_at: meta.created_at.or(meta.last_modified),
                size_bytes: meta.size_bytes,
                storage_path: meta.path,
            })
            .collect();

        bundles.sort_by(|a, b| {
            match (a.created_at, b.created_at) {
                (Some(x), Some(y)) => y.cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then_with(|| b.name.cmp(&a.name))
        });
        Ok(bundles)
    }
}
