use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;

use crate::storage::{ObjectMeta, ObjectStore, StoreError, StoreResult};

/// Directory under the root where puts are staged before the rename. It is
/// not part of the object namespace.
const STAGING_DIR: &str = ".kb-staging";

static STAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Object store backed by a local directory. Logical paths map directly to
/// files under `root`; folders are plain directories.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StoreResult<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            || relative.starts_with(STAGING_DIR)
        {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn logical_path(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}

fn meta_from_fs(path: String, metadata: &std::fs::Metadata) -> ObjectMeta {
    ObjectMeta {
        path,
        size_bytes: metadata.len(),
        last_modified: metadata.modified().ok().map(OffsetDateTime::from),
        created_at: metadata.created().ok().map(OffsetDateTime::from),
    }
}

fn staged_name() -> String {
    let seq = STAGE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{seq}", std::process::id())
}

async fn fsync_dir(path: &Path) -> StoreResult<()> {
    let dir = tokio::fs::File::open(path).await?;
    dir.sync_all().await?;
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        // Walk from the deepest directory named by the prefix.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let staging = self.staging_dir();
        let start = if dir_part.is_empty() {
            self.root.clone()
        } else {
            self.resolve(dir_part)?
        };

        let mut out = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    if path != staging {
                        pending.push(path);
                    }
                    continue;
                }
                let Some(logical) = self.logical_path(&path) else {
                    continue;
                };
                if !logical.starts_with(prefix) {
                    continue;
                }
                let metadata = entry.metadata().await?;
                out.push(meta_from_fs(logical, &metadata));
            }
        }
        Ok(out)
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>> {
        let file = self.resolve(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(metadata) if metadata.is_file() => Ok(Some(meta_from_fs(path.to_string(), &metadata))),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(path.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> StoreResult<()> {
        let dest = self.resolve(path)?;
        let parent = dest
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        let staging = self.staging_dir();
        tokio::fs::create_dir_all(&staging).await?;
        let tmp = staging.join(staged_name());

        let mut output = tokio::fs::File::create(&tmp).await?;
        output.write_all(&bytes).await?;
        output.sync_all().await?;
        drop(output);

        tokio::fs::rename(&tmp, &dest).await?;
        fsync_dir(&parent).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
