use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::storage::{ObjectMeta, ObjectStore, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    List,
    Head,
    Get,
    Put,
    Delete,
}

/// One entry in the call journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub path: String,
    pub ok: bool,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    last_modified: Option<OffsetDateTime>,
    created_at: Option<OffsetDateTime>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, StoredObject>,
    /// Path prefixes whose calls fail, per operation.
    faults: HashMap<StoreOp, Vec<String>>,
    /// Path prefixes whose calls never complete, per operation.
    stalls: HashMap<StoreOp, Vec<String>>,
    reverse_listing: bool,
    journal: Vec<StoreCall>,
}

impl Inner {
    fn matches(rules: &HashMap<StoreOp, Vec<String>>, op: StoreOp, path: &str) -> bool {
        rules
            .get(&op)
            .map(|prefixes| prefixes.iter().any(|p| path.starts_with(p.as_str())))
            .unwrap_or(false)
    }
}

/// In-process object store.
///
/// Used by the test suite and for dry runs. Failures and stalls can be
/// injected per operation and path prefix, and every call is journaled so
/// ordering (upload before delete) can be asserted.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Insert an object last modified `age_days` ago.
    pub fn insert_aged(&self, path: &str, bytes: impl Into<Vec<u8>>, age_days: i64) {
        let at = OffsetDateTime::now_utc() - time::Duration::days(age_days);
        self.insert_with_times(path, bytes, Some(at), Some(at));
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        self.insert_aged(path, bytes, 0);
    }

    pub fn insert_with_times(
        &self,
        path: &str,
        bytes: impl Into<Vec<u8>>,
        last_modified: Option<OffsetDateTime>,
        created_at: Option<OffsetDateTime>,
    ) {
        self.lock().objects.insert(
            path.to_string(),
            StoredObject {
                bytes: bytes.into(),
                content_type: "application/octet-stream".to_string(),
                last_modified,
                created_at,
            },
        );
    }

    /// Make every `op` on paths starting with `prefix` fail.
    pub fn fail(&self, op: StoreOp, prefix: &str) {
        self.lock()
            .faults
            .entry(op)
            .or_default()
            .push(prefix.to_string());
    }

    /// Make every `op` on paths starting with `prefix` hang.
    pub fn stall(&self, op: StoreOp, prefix: &str) {
        self.lock()
            .stalls
            .entry(op)
            .or_default()
            .push(prefix.to_string());
    }

    pub fn clear_faults(&self) {
        let mut inner = self.lock();
        inner.faults.clear();
        inner.stalls.clear();
    }

    /// Return listings in reverse path order, mimicking a store that does
    /// not list in a stable order.
    pub fn set_reverse_listing(&self, reverse: bool) {
        self.lock().reverse_listing = reverse;
    }

    pub fn contains(&self, path: &str) -> bool {
        self.lock().objects.contains_key(path)
    }

    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(path).map(|o| o.bytes.clone())
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.lock().objects.get(path).map(|o| o.content_type.clone())
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn journal(&self) -> Vec<StoreCall> {
        self.lock().journal.clone()
    }

    /// Record the call and report whether it should fail or stall.
    fn enter(&self, op: StoreOp, path: &str) -> (bool, bool) {
        let mut inner = self.lock();
        let failed = Inner::matches(&inner.faults, op, path);
        let stalled = Inner::matches(&inner.stalls, op, path);
        inner.journal.push(StoreCall {
            op,
            path: path.to_string(),
            ok: !failed && !stalled,
        });
        (failed, stalled)
    }

    async fn gate(&self, op: StoreOp, path: &str) -> StoreResult<()> {
        let (failed, stalled) = self.enter(op, path);
        if stalled {
            tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        }
        if failed {
            return Err(StoreError::Backend(format!("injected {op:?} failure for {path}")));
        }
        Ok(())
    }
}

fn meta_of(path: &str, object: &StoredObject) -> ObjectMeta {
    ObjectMeta {
        path: path.to_string(),
        size_bytes: object.bytes.len() as u64,
        last_modified: object.last_modified,
        created_at: object.created_at,
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        self.gate(StoreOp::List, prefix).await?;
        let inner = self.lock();
        let mut out: Vec<ObjectMeta> = inner
            .objects
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, object)| meta_of(path, object))
            .collect();
        if inner.reverse_listing {
            out.reverse();
        }
        Ok(out)
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>> {
        self.gate(StoreOp::Head, path).await?;
        Ok(self.lock().objects.get(path).map(|o| meta_of(path, o)))
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.gate(StoreOp::Get, path).await?;
        self.lock()
            .objects
            .get(path)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.gate(StoreOp::Put, path).await?;
        let now = OffsetDateTime::now_utc();
        let mut inner = self.lock();
        let created_at = inner
            .objects
            .get(path)
            .and_then(|o| o.created_at)
            .unwrap_or(now);
        inner.objects.insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified: Some(now),
                created_at: Some(created_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.gate(StoreOp::Delete, path).await?;
        self.lock().objects.remove(path);
        Ok(())
    }
}
