//! Primary-store persistor that mirrors to a unit's secondary store.
//!
//! Writes go to the primary synchronously and are replicated in detached
//! tasks; replication failures reach a [`ReplicationSink`] and nothing else.
//! Reads reconcile the key first, comparing last-modified timestamps, and are
//! always served from the primary. There is no key-level locking: when a
//! reconciliation and a write race on one key, the last physical write wins.

use docsync_storage::{GetOptions, Persistor, PutOptions, StorageResult};
use docsync_types::{ObjectStat, UnitId};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::PersistorCache;
use crate::error::{SyncError, SyncResult};
use crate::unit_store::UnitStore;

/// Outcome of reconciling one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The unit has no mirroring remote.
    NoSecondary,
    /// Both sides present with equal timestamps.
    Unchanged,
    /// Primary copied to secondary.
    Pushed,
    /// Secondary copied to primary.
    Pulled,
    /// Neither side has the key.
    Absent,
}

/// Counts from a full-unit reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Receives failures from background replication.
pub trait ReplicationSink: Send + Sync {
    fn replication_failed(&self, unit: &UnitId, key: &str, error: &SyncError);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSink;

impl ReplicationSink for LoggingSink {
    fn replication_failed(&self, unit: &UnitId, key: &str, error: &SyncError) {
        error!("replication of {unit}/{key} failed: {error}");
    }
}

/// Sink that logs and records the failure as the unit's `last_sync_error`.
#[derive(Clone)]
pub struct StatusSink {
    store: UnitStore,
}

impl StatusSink {
    pub fn new(store: UnitStore) -> Self {
        Self { store }
    }
}

impl ReplicationSink for StatusSink {
    fn replication_failed(&self, unit: &UnitId, key: &str, error: &SyncError) {
        error!("replication of {unit}/{key} failed: {error}");
        if let Err(e) = self.store.record_sync_error(unit, &error.to_string()) {
            warn!("failed to record sync error for unit {unit}: {e}");
        }
    }
}

async fn stat_opt(
    persistor: &dyn Persistor,
    location: &str,
    key: &str,
) -> StorageResult<Option<ObjectStat>> {
    match persistor.stat(location, key).await {
        Ok(stat) => Ok(Some(stat)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Copies one object across stores, keeping its modification time.
async fn transfer(
    from: &dyn Persistor,
    to: &dyn Persistor,
    location: &str,
    key: &str,
    stat: &ObjectStat,
) -> SyncResult<()> {
    let data = from
        .get(location, key, GetOptions::default())
        .await
        .map_err(|e| SyncError::Replication(format!("read {location}/{key} from {}: {e}", from.name())))?;
    to.put(location, key, data, PutOptions::preserving(stat.last_modified))
        .await
        .map_err(|e| SyncError::Replication(format!("write {location}/{key} to {}: {e}", to.name())))
}

/// Persistor facade over a primary store and each unit's optional secondary.
pub struct SyncPersistor {
    primary: Arc<dyn Persistor>,
    cache: Arc<PersistorCache>,
    sink: Arc<dyn ReplicationSink>,
    tasks: Mutex<JoinSet<()>>,
}

impl SyncPersistor {
    pub fn new(
        primary: Arc<dyn Persistor>,
        cache: Arc<PersistorCache>,
        sink: Arc<dyn ReplicationSink>,
    ) -> Self {
        Self {
            primary,
            cache,
            sink,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn primary(&self) -> &Arc<dyn Persistor> {
        &self.primary
    }

    pub fn cache(&self) -> &Arc<PersistorCache> {
        &self.cache
    }

    async fn secondary(&self, unit: &UnitId) -> SyncResult<Option<Arc<dyn Persistor>>> {
        Ok(self
            .cache
            .get_or_resolve(unit)
            .await?
            .and_then(|backend| backend.replication_persistor()))
    }

    fn spawn_detached<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Replicates the current primary state of `key` in a detached task.
    fn spawn_replication(&self, unit: &UnitId, key: &str) {
        let primary = Arc::clone(&self.primary);
        let cache = Arc::clone(&self.cache);
        let sink = Arc::clone(&self.sink);
        let unit = unit.clone();
        let key = key.to_string();

        self.spawn_detached(async move {
            let result = async {
                let Some(secondary) = cache
                    .get_or_resolve(&unit)
                    .await?
                    .and_then(|backend| backend.replication_persistor())
                else {
                    return Ok(false);
                };
                let stat = primary
                    .stat(unit.as_str(), &key)
                    .await
                    .map_err(|e| SyncError::Replication(e.to_string()))?;
                transfer(primary.as_ref(), secondary.as_ref(), unit.as_str(), &key, &stat).await?;
                Ok::<_, SyncError>(true)
            }
            .await;

            match result {
                Ok(true) => debug!("replicated {unit}/{key}"),
                Ok(false) => {}
                Err(e) => sink.replication_failed(&unit, &key, &e),
            }
        });
    }

    /// Writes to the primary. Replication is dispatched after success and
    /// never affects the result.
    pub async fn put(&self, unit: &UnitId, key: &str, data: Vec<u8>) -> SyncResult<()> {
        self.primary
            .put(unit.as_str(), key, data, PutOptions::default())
            .await?;
        self.spawn_replication(unit, key);
        Ok(())
    }

    pub async fn copy(&self, unit: &UnitId, from: &str, to: &str) -> SyncResult<()> {
        self.primary.copy(unit.as_str(), from, to).await?;
        self.spawn_replication(unit, to);
        Ok(())
    }

    /// Reads from the primary after reconciling the key.
    pub async fn get(&self, unit: &UnitId, key: &str, opts: GetOptions) -> SyncResult<Vec<u8>> {
        self.reconcile_quietly(unit, key).await;
        Ok(self.primary.get(unit.as_str(), key, opts).await?)
    }

    pub async fn stat(&self, unit: &UnitId, key: &str) -> SyncResult<ObjectStat> {
        self.reconcile_quietly(unit, key).await;
        Ok(self.primary.stat(unit.as_str(), key).await?)
    }

    /// Deletes from the primary; the secondary delete runs detached and only
    /// logs on failure.
    pub async fn delete(&self, unit: &UnitId, key: &str) -> SyncResult<()> {
        self.primary.delete(unit.as_str(), key).await?;

        let cache = Arc::clone(&self.cache);
        let unit = unit.clone();
        let key = key.to_string();
        self.spawn_detached(async move {
            let secondary = match cache.get_or_resolve(&unit).await {
                Ok(backend) => backend.and_then(|b| b.replication_persistor()),
                Err(e) => {
                    warn!("secondary delete of {unit}/{key} skipped: {e}");
                    return;
                }
            };
            if let Some(secondary) = secondary
                && let Err(e) = secondary.delete(unit.as_str(), &key).await
            {
                warn!("secondary delete of {unit}/{key} failed: {e}");
            }
        });
        Ok(())
    }

    async fn reconcile_quietly(&self, unit: &UnitId, key: &str) {
        if let Err(e) = self.reconcile(unit, key).await {
            warn!("reconciliation of {unit}/{key} failed, serving primary: {e}");
        }
    }

    /// Makes both sides agree on `key`: the strictly newer side overwrites
    /// the older, a side holding the only copy fills the other.
    pub async fn reconcile(&self, unit: &UnitId, key: &str) -> SyncResult<Reconciliation> {
        let Some(secondary) = self.secondary(unit).await? else {
            return Ok(Reconciliation::NoSecondary);
        };
        let location = unit.as_str();
        let primary = self.primary.as_ref();
        let secondary = secondary.as_ref();

        let (p, s) = tokio::join!(
            stat_opt(primary, location, key),
            stat_opt(secondary, location, key)
        );
        let p = p?;
        let s = s.map_err(|e| SyncError::Replication(format!("stat on {}: {e}", secondary.name())))?;

        let outcome = match (p, s) {
            (None, None) => Reconciliation::Absent,
            (Some(p), None) => {
                transfer(primary, secondary, location, key, &p).await?;
                Reconciliation::Pushed
            }
            (None, Some(s)) => {
                transfer(secondary, primary, location, key, &s).await?;
                Reconciliation::Pulled
            }
            (Some(p), Some(s)) if p.last_modified > s.last_modified => {
                transfer(primary, secondary, location, key, &p).await?;
                Reconciliation::Pushed
            }
            (Some(p), Some(s)) if s.last_modified > p.last_modified => {
                transfer(secondary, primary, location, key, &s).await?;
                Reconciliation::Pulled
            }
            (Some(_), Some(_)) => Reconciliation::Unchanged,
        };
        if matches!(outcome, Reconciliation::Pushed | Reconciliation::Pulled) {
            debug!("reconciled {unit}/{key}: {outcome:?}");
        }
        Ok(outcome)
    }

    /// Reconciles every key found on either side. Per-key failures are
    /// counted, not returned.
    pub async fn sync_unit(&self, unit: &UnitId) -> SyncResult<SyncReport> {
        let Some(backend) = self.cache.get_or_resolve(unit).await? else {
            return Err(SyncError::NotLinked(unit.to_string()));
        };
        let Some(secondary) = backend.replication_persistor() else {
            debug!("unit {unit} remote does not mirror objects, nothing to sync");
            return Ok(SyncReport::default());
        };
        let location = unit.as_str();
        let mut keys: BTreeSet<String> =
            self.primary.list_keys(location, "").await?.into_iter().collect();
        keys.extend(
            secondary
                .list_keys(location, "")
                .await
                .map_err(SyncError::from_connect)?,
        );

        let mut report = SyncReport::default();
        for key in &keys {
            match self.reconcile(unit, key).await {
                Ok(Reconciliation::Pushed) => report.pushed += 1,
                Ok(Reconciliation::Pulled) => report.pulled += 1,
                Ok(_) => report.unchanged += 1,
                Err(e) => {
                    warn!("sync of {unit}/{key} failed: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(
            "synced unit {unit}: {} pushed, {} pulled, {} unchanged, {} failed",
            report.pushed, report.pulled, report.unchanged, report.failed
        );
        Ok(report)
    }

    /// Waits for all in-flight replication tasks.
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = {
                let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *guard)
            };
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("replication task panicked: {e}");
                }
            }
        }
    }
}
