use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use kb_lifecycle::lifecycle::{classify, read_bundle_entries, RetentionPolicy};
use kb_lifecycle::storage::{MemoryStore, ObjectMeta, StoreOp, StoreResult};
use kb_lifecycle::{Error, LifecycleConfig, LifecycleManager, ObjectStore, Shutdown};

fn manager(store: &Arc<MemoryStore>) -> LifecycleManager {
    LifecycleManager::new(store.clone(), LifecycleConfig::default()).expect("manager")
}

/// Wraps a `MemoryStore` and requests shutdown once a successful call of
/// `op` on a path under `prefix` completes.
struct ShutdownAfter {
    inner: Arc<MemoryStore>,
    op: StoreOp,
    prefix: &'static str,
    shutdown: Shutdown,
}

impl ShutdownAfter {
    fn trip<T>(&self, op: StoreOp, path: &str, result: StoreResult<T>) -> StoreResult<T> {
        if result.is_ok() && op == self.op && path.starts_with(self.prefix) {
            self.shutdown.trigger();
        }
        result
    }
}

#[async_trait]
impl ObjectStore for ShutdownAfter {
    async fn list(&self, prefix: &str) -> StoreResult<Vec<ObjectMeta>> {
        let result = self.inner.list(prefix).await;
        self.trip(StoreOp::List, prefix, result)
    }

    async fn head(&self, path: &str) -> StoreResult<Option<ObjectMeta>> {
        let result = self.inner.head(path).await;
        self.trip(StoreOp::Head, path, result)
    }

    async fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        let result = self.inner.get(path).await;
        self.trip(StoreOp::Get, path, result)
    }

    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let result = self.inner.put(path, bytes, content_type).await;
        self.trip(StoreOp::Put, path, result)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let result = self.inner.delete(path).await;
        self.trip(StoreOp::Delete, path, result)
    }
}

fn manager_stopping_after(store: &Arc<MemoryStore>, op: StoreOp, prefix: &'static str) -> LifecycleManager {
    let shutdown = Shutdown::new();
    let wrapped = Arc::new(ShutdownAfter {
        inner: store.clone(),
        op,
        prefix,
        shutdown: shutdown.clone(),
    });
    LifecycleManager::with_shutdown(wrapped, LifecycleConfig::default(), shutdown).expect("manager")
}

fn policy() -> RetentionPolicy {
    RetentionPolicy::new(30, 90).expect("policy")
}

fn record(title: &str, content: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({ "title": title, "content": content })).expect("encode")
}

#[tokio::test]
async fn archive_twice_is_a_noop_the_second_time() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 40);
    store.insert_aged("processed/b.json", record("b", "b"), 60);
    store.insert_aged("raw/fresh.txt", b"f".to_vec(), 2);
    let manager = manager(&store);

    let first = manager.archive_old_data(&policy()).await?;
    assert_eq!(first.archived, 2);
    assert_eq!(first.deleted, 2);

    let second = manager.archive_old_data(&policy()).await?;
    assert_eq!(second.archived, 0);
    assert_eq!(second.deleted, 0);
    assert!(second.archive_path.is_none());
    assert_eq!(manager.list_archives().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn bundle_is_stored_before_any_source_delete() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..5 {
        store.insert_aged(&format!("raw/{i}.txt"), vec![b'x'; 64], 45);
    }
    let outcome = manager(&store).archive_old_data(&policy()).await?;
    let bundle_path = outcome.archive_path.expect("bundle written");

    let journal = store.journal();
    let upload = journal
        .iter()
        .position(|call| call.op == StoreOp::Put && call.path == bundle_path && call.ok)
        .expect("bundle upload journaled");
    let source_deletes: Vec<usize> = journal
        .iter()
        .enumerate()
        .filter(|(_, call)| call.op == StoreOp::Delete && call.path.starts_with("raw/"))
        .map(|(idx, _)| idx)
        .collect();

    assert_eq!(source_deletes.len(), 5);
    assert!(source_deletes.iter().all(|idx| *idx > upload));
    Ok(())
}

#[tokio::test]
async fn failed_upload_means_zero_deletions() {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    store.fail(StoreOp::Put, "archive/");

    let result = manager(&store).archive_old_data(&policy()).await;
    assert!(matches!(result, Err(Error::Upload { .. })));
    assert!(store.contains("raw/a.txt"));
    assert!(!store
        .journal()
        .iter()
        .any(|call| call.op == StoreOp::Delete && call.path.starts_with("raw/")));
}

#[tokio::test]
async fn one_failed_download_is_contained() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    store.insert_aged("raw/b.txt", b"b".to_vec(), 45);
    store.insert_aged("raw/c.txt", b"c".to_vec(), 45);
    store.fail(StoreOp::Get, "raw/b.txt");

    let outcome = manager(&store).archive_old_data(&policy()).await?;
    assert_eq!(outcome.archived, 2);
    assert_eq!(outcome.failure_count(), 1);
    assert_eq!(outcome.download_failures, 1);

    let bytes = store
        .bytes(outcome.archive_path.as_deref().expect("bundle"))
        .expect("bundle stored");
    assert_eq!(
        read_bundle_entries(&bytes)?,
        vec!["raw/a.txt".to_string(), "raw/c.txt".to_string()]
    );
    assert!(store.contains("raw/b.txt"));
    assert!(!store.contains("raw/a.txt"));
    assert!(!store.contains("raw/c.txt"));
    Ok(())
}

#[tokio::test]
async fn retention_tiers_for_reference_ages() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    for age in [10, 29, 31, 95, 400] {
        store.insert_aged(&format!("raw/age-{age:03}.txt"), b"x".to_vec(), age);
    }
    let manager = manager(&store);

    let inventory = manager.get_storage_stats(&policy()).await?;
    let plan = classify(&inventory, &policy())?;
    let ages = |objects: &[kb_lifecycle::lifecycle::StorageObject]| -> Vec<i64> {
        objects.iter().map(|o| o.age_days).collect()
    };

    assert_eq!(ages(&plan.fresh), vec![10, 29]);
    assert_eq!(ages(&plan.archivable), vec![31]);
    assert_eq!(ages(&plan.deletable), vec![95, 400]);
    assert_eq!(inventory.aged_objects.len(), 3);
    Ok(())
}

#[tokio::test]
async fn duplicate_pair_points_at_first_in_scan_order() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.set_reverse_listing(true);
    let body = "Shut the main valve. ".repeat(80);
    store.insert("processed/manuals/pump-v2.json", record("Pump", &format!("{body}rev 2")));
    store.insert("processed/manuals/pump-v1.json", record("Pump", &format!("{body}rev 1")));
    let manager = manager(&store);

    let scan = manager.find_duplicates().await?;
    assert_eq!(scan.pairs.len(), 1);
    assert_eq!(scan.pairs[0].original_path, "processed/manuals/pump-v1.json");
    assert_eq!(scan.pairs[0].duplicate_path, "processed/manuals/pump-v2.json");

    let inventory = manager.get_storage_stats(&policy()).await?;
    assert_eq!(inventory.duplicates, scan.pairs);

    let removed = manager.remove_duplicates().await?;
    assert_eq!(removed.removed, 1);
    assert!(store.contains("processed/manuals/pump-v1.json"));
    assert!(!store.contains("processed/manuals/pump-v2.json"));
    Ok(())
}

#[tokio::test]
async fn export_reports_included_and_skipped() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..4 {
        store.insert(&format!("raw/{i}.txt"), b"r".to_vec());
        store.insert(&format!("uploads/{i}.pdf"), b"u".to_vec());
    }
    store.insert("archive/archive_2025-12-01.zip", b"old".to_vec());
    store.fail(StoreOp::Get, "uploads/3.pdf");

    let outcome = manager(&store).export_all_data().await?;
    assert_eq!(outcome.included_count, 7);
    assert_eq!(outcome.skipped_count, 1);

    let bytes = store.bytes(&outcome.export_path).expect("export stored");
    assert_eq!(read_bundle_entries(&bytes)?.len(), 7);
    assert_eq!(store.paths().len(), 10);
    Ok(())
}

#[tokio::test]
async fn live_lease_blocks_mutating_sweeps() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    let expires_at = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs()
        + 600;
    store.insert(
        "locks/lifecycle.lease",
        serde_json::to_vec(&json!({
            "owner": "other-host",
            "operation": "archive",
            "acquired_at": 0,
            "expires_at": expires_at,
        }))?,
    );
    let manager = manager(&store);

    assert!(matches!(
        manager.archive_old_data(&policy()).await,
        Err(Error::SweepInProgress { .. })
    ));
    assert!(matches!(
        manager.delete_old_data(30).await,
        Err(Error::SweepInProgress { .. })
    ));
    assert!(store.contains("raw/a.txt"));

    // Read-only operations ignore the lease.
    assert_eq!(manager.get_storage_stats(&policy()).await?.total_files, 1);
    Ok(())
}

#[tokio::test]
async fn lease_is_released_after_failed_sweep() {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    store.fail(StoreOp::Put, "archive/");
    let manager = manager(&store);

    assert!(manager.archive_old_data(&policy()).await.is_err());
    assert!(!store.contains("locks/lifecycle.lease"));
}

#[tokio::test]
async fn invalid_policy_is_rejected_before_any_io() {
    let store = Arc::new(MemoryStore::new());
    let inverted = RetentionPolicy {
        archive_threshold_days: 90,
        deletion_threshold_days: 30,
    };

    let result = manager(&store).archive_old_data(&inverted).await;
    assert!(matches!(result, Err(Error::Policy(_))));
    assert!(store.journal().is_empty());
}

#[tokio::test]
async fn triggered_shutdown_stops_before_upload() {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    let manager = manager(&store);
    manager.shutdown().trigger();

    let result = manager.archive_old_data(&policy()).await;
    assert!(matches!(result, Err(Error::Cancelled { .. })));
    assert!(store.paths().iter().all(|p| !p.starts_with("archive/")));
    assert!(store.contains("raw/a.txt"));
}

#[tokio::test]
async fn timed_out_download_is_a_per_object_failure() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    store.insert_aged("raw/b.txt", b"b".to_vec(), 45);
    store.stall(StoreOp::Get, "raw/b.txt");
    let config = LifecycleConfig {
        store_timeout_ms: 50,
        ..Default::default()
    };
    let manager = LifecycleManager::new(store.clone(), config)?;

    let outcome = manager.archive_old_data(&policy()).await?;
    assert_eq!(outcome.archived, 1);
    assert_eq!(outcome.deleted, 1);
    assert_eq!(outcome.download_failures, 1);
    assert!(outcome.errors[0].contains("timed out"));
    assert_eq!(outcome.contained_paths, vec!["raw/a.txt".to_string()]);
    assert!(store.contains("raw/b.txt"));
    assert!(!store.contains("raw/a.txt"));
    Ok(())
}

#[tokio::test]
async fn shutdown_after_upload_interrupts_deletes() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 45);
    store.insert_aged("raw/b.txt", b"b".to_vec(), 45);
    let manager = manager_stopping_after(&store, StoreOp::Put, "archive/");

    let outcome = manager.archive_old_data(&policy()).await?;
    assert!(outcome.interrupted);
    assert_eq!(outcome.archived, 2);
    assert_eq!(outcome.deleted, 0);
    assert!(store.contains(outcome.archive_path.as_deref().expect("bundle")));
    assert!(store.contains("raw/a.txt"));
    assert!(store.contains("raw/b.txt"));
    Ok(())
}

#[tokio::test]
async fn shutdown_mid_delete_sweep_stops_at_next_object() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_aged("raw/a.txt", b"a".to_vec(), 200);
    store.insert_aged("raw/b.txt", b"b".to_vec(), 200);
    let manager = manager_stopping_after(&store, StoreOp::Delete, "raw/");

    let outcome = manager.delete_old_data(90).await?;
    assert!(outcome.interrupted);
    assert_eq!(outcome.deleted, 1);
    assert!(!store.contains("raw/a.txt"));
    assert!(store.contains("raw/b.txt"));
    Ok(())
}

#[tokio::test]
async fn shutdown_mid_dedup_removal_stops_at_next_duplicate() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    for name in ["1", "2", "3"] {
        store.insert(&format!("processed/{name}.json"), record("Pump", "Prime before use."));
    }
    let manager = manager_stopping_after(&store, StoreOp::Delete, "processed/");

    let outcome = manager.remove_duplicates().await?;
    assert!(outcome.interrupted);
    assert_eq!(outcome.removed, 1);
    assert_eq!(outcome.pairs.len(), 2);
    assert!(store.contains("processed/1.json"));
    assert!(!store.contains("processed/2.json"));
    assert!(store.contains("processed/3.json"));
    Ok(())
}
