//! Shared fakes for docsync-sync integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use docsync_storage::{
    GetOptions, MemoryPersistor, Persistor, PutOptions, StorageError, StorageResult,
};
use docsync_sync::{
    BackupPolicyStore, BackupRunner, ConfigProvider, RemoteBackend, RemoteConnector, SyncError,
    SyncResult, TreeProvider, UnitStore,
};
use docsync_types::{BackendKind, BackupPolicy, Folder, ObjectStat, RemoteTarget, UnitId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::{Barrier, Notify};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("docsync_sync=debug,docsync_storage=debug"))
        .with_test_writer()
        .try_init();
}

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
}

pub fn target(kind: BackendKind, endpoint: &str) -> RemoteTarget {
    RemoteTarget {
        backend_kind: kind,
        endpoint_url: endpoint.to_string(),
        username: "user".to_string(),
        secret: "secret".to_string(),
        base_path: String::new(),
        enabled: true,
    }
}

/// Whether a usable `git` binary is on PATH.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

// ── Config and connection ────────────────────────────────────────

/// Config provider backed by a map, counting lookups.
#[derive(Default)]
pub struct StaticConfigProvider {
    targets: Mutex<HashMap<UnitId, RemoteTarget>>,
    pub lookups: AtomicUsize,
}

impl StaticConfigProvider {
    pub fn set(&self, unit: &UnitId, target: RemoteTarget) {
        self.targets.lock().unwrap().insert(unit.clone(), target);
    }

    pub fn remove(&self, unit: &UnitId) {
        self.targets.lock().unwrap().remove(unit);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigProvider for StaticConfigProvider {
    async fn get_config(&self, unit: &UnitId) -> SyncResult<Option<RemoteTarget>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.targets.lock().unwrap().get(unit).cloned())
    }
}

/// Connector handing out pre-registered backends by endpoint URL.
#[derive(Default)]
pub struct StaticConnector {
    backends: Mutex<HashMap<String, RemoteBackend>>,
    pub connects: AtomicUsize,
}

impl StaticConnector {
    pub fn register(&self, endpoint: &str, backend: RemoteBackend) {
        self.backends
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), backend);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConnector for StaticConnector {
    async fn connect(&self, target: &RemoteTarget) -> SyncResult<RemoteBackend> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.backends
            .lock()
            .unwrap()
            .get(&target.endpoint_url)
            .cloned()
            .ok_or_else(|| SyncError::Connection(format!("unknown endpoint {}", target.endpoint_url)))
    }
}

// ── Persistors ───────────────────────────────────────────────────

/// A secondary store that is never reachable.
pub struct FailingPersistor;

fn unreachable_err() -> StorageError {
    StorageError::Connection("connection refused".to_string())
}

#[async_trait]
impl Persistor for FailingPersistor {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn put(&self, _: &str, _: &str, _: Vec<u8>, _: PutOptions) -> StorageResult<()> {
        Err(unreachable_err())
    }

    async fn get(&self, _: &str, _: &str, _: GetOptions) -> StorageResult<Vec<u8>> {
        Err(unreachable_err())
    }

    async fn stat(&self, _: &str, _: &str) -> StorageResult<ObjectStat> {
        Err(unreachable_err())
    }

    async fn delete(&self, _: &str, _: &str) -> StorageResult<()> {
        Err(unreachable_err())
    }

    async fn delete_directory(&self, _: &str, _: &str) -> StorageResult<()> {
        Err(unreachable_err())
    }

    async fn list_stats(&self, _: &str, _: &str) -> StorageResult<Vec<(String, ObjectStat)>> {
        Err(unreachable_err())
    }

    async fn check_connection(&self) -> StorageResult<()> {
        Err(unreachable_err())
    }
}

/// Memory persistor whose puts park until released, so tests can order
/// the physical completion of concurrent writes.
#[derive(Default)]
pub struct GatedPersistor {
    pub inner: MemoryPersistor,
    gated: Mutex<bool>,
    pub parked: Notify,
    release: Notify,
}

impl GatedPersistor {
    pub fn close_gate(&self) {
        *self.gated.lock().unwrap() = true;
    }

    /// Lets one parked put through.
    pub fn release_one(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl Persistor for GatedPersistor {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        opts: PutOptions,
    ) -> StorageResult<()> {
        let gated = *self.gated.lock().unwrap();
        if gated {
            self.parked.notify_one();
            self.release.notified().await;
        }
        self.inner.put(location, key, data, opts).await
    }

    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>> {
        self.inner.get(location, key, opts).await
    }

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat> {
        self.inner.stat(location, key).await
    }

    async fn delete(&self, location: &str, key: &str) -> StorageResult<()> {
        self.inner.delete(location, key).await
    }

    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()> {
        self.inner.delete_directory(location, prefix).await
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>> {
        self.inner.list_stats(location, prefix).await
    }

    async fn check_connection(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Memory persistor that refuses to delete chosen directories.
#[derive(Default)]
pub struct StuckDeletePersistor {
    pub inner: MemoryPersistor,
    stuck: Mutex<HashSet<String>>,
}

impl StuckDeletePersistor {
    pub fn stick(&self, prefix: &str) {
        self.stuck.lock().unwrap().insert(prefix.to_string());
    }
}

#[async_trait]
impl Persistor for StuckDeletePersistor {
    fn name(&self) -> &'static str {
        "stuck-delete"
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        opts: PutOptions,
    ) -> StorageResult<()> {
        self.inner.put(location, key, data, opts).await
    }

    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>> {
        self.inner.get(location, key, opts).await
    }

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat> {
        self.inner.stat(location, key).await
    }

    async fn delete(&self, location: &str, key: &str) -> StorageResult<()> {
        self.inner.delete(location, key).await
    }

    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()> {
        if self.stuck.lock().unwrap().contains(prefix) {
            return Err(StorageError::Connection("permission denied".to_string()));
        }
        self.inner.delete_directory(location, prefix).await
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>> {
        self.inner.list_stats(location, prefix).await
    }

    async fn check_connection(&self) -> StorageResult<()> {
        Ok(())
    }
}

// ── Content ──────────────────────────────────────────────────────

/// Tree provider over in-memory documents and files.
pub struct MemoryTree {
    tree: Mutex<Folder>,
    docs: Mutex<HashMap<String, String>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    broken: Mutex<HashSet<String>>,
    fail_tree: Mutex<bool>,
}

impl MemoryTree {
    pub fn new(tree: Folder) -> Self {
        Self {
            tree: Mutex::new(tree),
            docs: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            broken: Mutex::new(HashSet::new()),
            fail_tree: Mutex::new(false),
        }
    }

    pub fn set_tree(&self, tree: Folder) {
        *self.tree.lock().unwrap() = tree;
    }

    pub fn doc(self, id: &str, content: &str) -> Self {
        self.set_doc(id, content);
        self
    }

    pub fn file(self, id: &str, content: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_vec());
        self
    }

    pub fn set_doc(&self, id: &str, content: &str) {
        self.docs
            .lock()
            .unwrap()
            .insert(id.to_string(), content.to_string());
    }

    /// Makes content lookups for `id` fail.
    pub fn break_entry(&self, id: &str) {
        self.broken.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_tree(&self) {
        *self.fail_tree.lock().unwrap() = true;
    }
}

#[async_trait]
impl TreeProvider for MemoryTree {
    async fn get_tree(&self, _unit: &UnitId) -> SyncResult<Folder> {
        if *self.fail_tree.lock().unwrap() {
            return Err(SyncError::Content("tree service unavailable".to_string()));
        }
        Ok(self.tree.lock().unwrap().clone())
    }

    async fn get_document_content(&self, _unit: &UnitId, doc_id: &str) -> SyncResult<String> {
        if self.broken.lock().unwrap().contains(doc_id) {
            return Err(SyncError::Content(format!("document {doc_id} unreadable")));
        }
        self.docs
            .lock()
            .unwrap()
            .get(doc_id)
            .cloned()
            .ok_or_else(|| SyncError::Content(format!("no document {doc_id}")))
    }

    async fn get_file_stream(
        &self,
        _unit: &UnitId,
        file_id: &str,
        _hash: &str,
    ) -> SyncResult<Vec<u8>> {
        if self.broken.lock().unwrap().contains(file_id) {
            return Err(SyncError::Content(format!("file {file_id} unreadable")));
        }
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| SyncError::Content(format!("no file {file_id}")))
    }
}

// ── Scheduling ───────────────────────────────────────────────────

/// Runner that counts dispatched backups.
#[derive(Default)]
pub struct CountingRunner {
    pub runs: AtomicUsize,
}

impl CountingRunner {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackupRunner for CountingRunner {
    async fn run_backup(&self, _unit: &UnitId) -> SyncResult<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Policy store whose loads all wait at a barrier, so concurrent callers
/// observe the same counters before either writes.
pub struct BarrierStore {
    pub inner: UnitStore,
    barrier: Option<Barrier>,
}

impl BarrierStore {
    pub fn new(inner: UnitStore, parties: Option<usize>) -> Self {
        Self {
            inner,
            barrier: parties.map(Barrier::new),
        }
    }
}

#[async_trait]
impl BackupPolicyStore for BarrierStore {
    async fn load_policy(&self, unit: &UnitId) -> SyncResult<BackupPolicy> {
        let policy = self.inner.load_policy(unit)?;
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        Ok(policy)
    }

    async fn save_counters(
        &self,
        unit: &UnitId,
        modification_count: u32,
        next_check_time: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.inner
            .save_counters(unit, modification_count, next_check_time)
    }
}

/// Policy store that always fails.
pub struct BrokenStore;

#[async_trait]
impl BackupPolicyStore for BrokenStore {
    async fn load_policy(&self, _unit: &UnitId) -> SyncResult<BackupPolicy> {
        Err(SyncError::Database("disk I/O error".to_string()))
    }

    async fn save_counters(&self, _: &UnitId, _: u32, _: DateTime<Utc>) -> SyncResult<()> {
        Err(SyncError::Database("disk I/O error".to_string()))
    }
}
