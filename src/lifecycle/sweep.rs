//! Per-object plumbing shared by every sweep.
//!
//! Each store call is bounded by a timeout, downloads run through a
//! bounded order-preserving pipeline, and a cancellation flag is checked
//! before every item. Mutating sweeps additionally hold an advisory lease
//! object in the store so two sweeps do not work the same folders at once.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, ObjectStore, StoreError, StoreResult, JSON_CONTENT_TYPE};

/// Cooperative cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Store handle with the limits of one engine applied.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    workers: usize,
    shutdown: Shutdown,
}

impl Sweeper {
    pub fn new(store: Arc<dyn ObjectStore>, timeout: Duration, workers: usize, shutdown: Shutdown) -> Self {
        Self {
            store,
            timeout,
            workers: workers.max(1),
            shutdown,
        }
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Fail with `Cancelled` once shutdown was requested.
    pub fn check(&self, stage: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled { stage });
        }
        Ok(())
    }

    async fn bounded<T, F>(&self, op: &'static str, path: &str, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                path: path.to_string(),
                after: self.timeout,
            }),
        }
    }

    pub async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.bounded("list", prefix, self.store.list(prefix)).await
    }

    pub async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>> {
        self.bounded("head", path, self.store.head(path)).await
    }

    pub async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.bounded("get", path, self.store.get(path)).await
    }

    pub async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.bounded("put", path, self.store.put(path, bytes, content_type))
            .await
    }

    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        self.bounded("delete", path, self.store.delete(path)).await
    }

    /// Download `paths` with at most `workers` requests in flight and hand
    /// each result to `visit` in the order of `paths`. Stops with
    /// `Cancelled` at the first item seen after shutdown was requested.
    pub async fn for_each_fetched<F>(&self, paths: Vec<String>, stage: &'static str, mut visit: F) -> Result<()>
    where
        F: FnMut(String, StoreResult<Vec<u8>>) -> Result<()>,
    {
        let mut fetched = stream::iter(paths)
            .map(|path| async move {
                let result = self.get(&path).await;
                (path, result)
            })
            .buffered(self.workers);

        while let Some((path, result)) = fetched.next().await {
            self.check(stage)?;
            debug!("{stage}: fetched {path}");
            visit(path, result)?;
        }
        Ok(())
    }

    /// Take the sweep lease at `path`. A live lease held by another owner
    /// fails with `SweepInProgress`; an expired or unreadable one is taken
    /// over. The store has no compare-and-swap, so the lease is re-read
    /// after writing to catch the common race.
    pub async fn acquire_lease(&self, path: &str, ttl: Duration, operation: &str) -> Result<SweepLease> {
        let now = since_epoch().as_secs();
        if let Some(current) = self.read_lease(path).await? {
            if current.expires_at > now {
                return Err(Error::SweepInProgress {
                    path: path.to_string(),
                    owner: current.owner,
                });
            }
            warn!("taking over expired sweep lease {path} from {}", current.owner);
        }

        let record = LeaseRecord {
            owner: format!("{operation}-{}-{}", std::process::id(), since_epoch().as_nanos()),
            operation: operation.to_string(),
            acquired_at: now,
            expires_at: now.saturating_add(ttl.as_secs()),
        };
        self.put(path, serde_json::to_vec(&record)?, JSON_CONTENT_TYPE)
            .await?;

        let stored = self.read_lease(path).await?.map(|r| r.owner);
        if stored.as_deref() != Some(record.owner.as_str()) {
            return Err(Error::SweepInProgress {
                path: path.to_string(),
                owner: stored.unwrap_or_else(|| "unknown".to_string()),
            });
        }
        Ok(SweepLease {
            path: path.to_string(),
            owner: record.owner,
        })
    }

    /// Release a lease taken by `acquire_lease`. Failures only log; an
    /// unreleased lease expires on its own.
    pub async fn release_lease(&self, lease: SweepLease) {
        match self.read_lease(&lease.path).await {
            Ok(Some(stored)) if stored.owner == lease.owner => {
                if let Err(err) = self.delete(&lease.path).await {
                    warn!("failed to release sweep lease {}: {err}", lease.path);
                }
            }
            Ok(_) => warn!("sweep lease {} no longer held by {}", lease.path, lease.owner),
            Err(err) => warn!("failed to read sweep lease {}: {err}", lease.path),
        }
    }

    async fn read_lease(&self, path: &str) -> Result<Option<LeaseRecord>> {
        let bytes = match self.get(path).await {
            Ok(bytes) => bytes,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice::<LeaseRecord>(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!("ignoring unreadable sweep lease {path}: {err}");
                Ok(None)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    owner: String,
    operation: String,
    acquired_at: u64,
    expires_at: u64,
}

/// Proof of holding the sweep lease.
#[derive(Debug)]
pub struct SweepLease {
    path: String,
    owner: String,
}

impl SweepLease {
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

fn since_epoch() -> Duration {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default()
}
