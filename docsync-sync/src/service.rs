//! Application-facing control surface for remotes, sync and backups.

use docsync_crypto::CredentialVault;
use docsync_storage::Persistor;
use docsync_types::{
    BackendKind, BackupPolicy, BackupPolicyUpdate, RemoteConfig, RemoteTarget, Snapshot,
    SyncStatus, UnitId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::PersistorCache;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::engine::{BackupEngine, SnapshotOutcome};
use crate::error::{SyncError, SyncResult};
use crate::provider::{StoredConfigProvider, TreeProvider};
use crate::remote::{DefaultConnector, RemoteConnector};
use crate::scheduler::{BackupRunner, BackupScheduler, CounterSerialization, ScheduleOutcome};
use crate::snapshot::validate_unit_id;
use crate::sync_persistor::{StatusSink, SyncPersistor, SyncReport};
use crate::unit_store::UnitStore;

/// Fields required to link a unit to a remote.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRequest {
    pub backend_kind: BackendKind,
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub base_path: String,
}

impl std::fmt::Debug for LinkRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkRequest")
            .field("backend_kind", &self.backend_kind)
            .field("endpoint_url", &self.endpoint_url)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl LinkRequest {
    /// Checks required fields without touching the network.
    pub fn validate(&self) -> SyncResult<()> {
        let missing = |field: &str| Err(SyncError::Validation(format!("{field} is required")));

        // S3 without an endpoint targets AWS itself.
        if self.backend_kind != BackendKind::S3 && self.endpoint_url.trim().is_empty() {
            return missing("endpoint_url");
        }
        if self.backend_kind == BackendKind::S3 && self.base_path.trim_matches('/').is_empty() {
            return missing("base_path");
        }
        if self.backend_kind.requires_credentials() {
            if self.username.trim().is_empty() {
                return missing("username");
            }
            if self.secret.is_empty() {
                return missing("secret");
            }
        }
        Ok(())
    }

    fn target(&self) -> RemoteTarget {
        RemoteTarget {
            backend_kind: self.backend_kind,
            endpoint_url: self.endpoint_url.trim().to_string(),
            username: self.username.trim().to_string(),
            secret: self.secret.clone(),
            base_path: self.base_path.trim().to_string(),
            enabled: true,
        }
    }
}

/// Builder for [`RemoteService`].
pub struct RemoteServiceBuilder {
    config: SyncConfig,
    store: UnitStore,
    primary: Arc<dyn Persistor>,
    tree: Arc<dyn TreeProvider>,
    connector: Option<Arc<dyn RemoteConnector>>,
    clock: Option<Arc<dyn Clock>>,
    serialization: CounterSerialization,
}

impl RemoteServiceBuilder {
    pub fn connector(mut self, connector: Arc<dyn RemoteConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn serialization(mut self, serialization: CounterSerialization) -> Self {
        self.serialization = serialization;
        self
    }

    pub fn build(self) -> SyncResult<RemoteService> {
        self.config.validate()?;
        let vault = self.config.credential_vault()?;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let connector: Arc<dyn RemoteConnector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(DefaultConnector::new(self.config.clone())),
        };

        let provider = Arc::new(StoredConfigProvider::new(self.store.clone(), vault.clone()));
        let cache = Arc::new(PersistorCache::new(provider, Arc::clone(&connector)));
        let persistor = Arc::new(SyncPersistor::new(
            self.primary,
            Arc::clone(&cache),
            Arc::new(StatusSink::new(self.store.clone())),
        ));
        let engine = Arc::new(BackupEngine::new(
            self.store.clone(),
            Arc::clone(&cache),
            self.tree,
            Arc::clone(&clock),
            self.config.snapshot_concurrency,
        ));
        let runner: Arc<dyn BackupRunner> = engine.clone();
        let scheduler = BackupScheduler::with_serialization(
            Arc::new(self.store.clone()),
            runner,
            Arc::clone(&clock),
            self.serialization,
        );

        Ok(RemoteService {
            store: self.store,
            vault,
            connector,
            cache,
            persistor,
            engine,
            scheduler,
            clock,
        })
    }
}

/// Links units to remotes and drives sync and backups for them.
pub struct RemoteService {
    store: UnitStore,
    vault: CredentialVault,
    connector: Arc<dyn RemoteConnector>,
    cache: Arc<PersistorCache>,
    persistor: Arc<SyncPersistor>,
    engine: Arc<BackupEngine>,
    scheduler: BackupScheduler,
    clock: Arc<dyn Clock>,
}

impl RemoteService {
    pub fn builder(
        config: SyncConfig,
        store: UnitStore,
        primary: Arc<dyn Persistor>,
        tree: Arc<dyn TreeProvider>,
    ) -> RemoteServiceBuilder {
        RemoteServiceBuilder {
            config,
            store,
            primary,
            tree,
            connector: None,
            clock: None,
            serialization: CounterSerialization::default(),
        }
    }

    /// The replicating persistor applications write through.
    pub fn persistor(&self) -> &Arc<SyncPersistor> {
        &self.persistor
    }

    pub fn engine(&self) -> &Arc<BackupEngine> {
        &self.engine
    }

    pub fn scheduler(&self) -> &BackupScheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &UnitStore {
        &self.store
    }

    /// Validates, checks connectivity, then stores the encrypted remote.
    pub async fn link(&self, unit: &UnitId, request: LinkRequest) -> SyncResult<()> {
        validate_unit_id(unit)?;
        request.validate()?;

        let target = request.target();
        let backend = self.connector.connect(&target).await.map_err(|e| match e {
            SyncError::Storage(storage) => SyncError::Validation(storage.to_string()),
            other => other,
        })?;
        backend.check_connection().await?;

        let encrypted_secret = if target.secret.is_empty() {
            String::new()
        } else {
            self.vault.encrypt(&target.secret)?
        };
        let remote = RemoteConfig {
            backend_kind: target.backend_kind,
            endpoint_url: target.endpoint_url,
            username: target.username,
            encrypted_secret,
            base_path: target.base_path,
            enabled: true,
            linked_at: Some(self.clock.now()),
            unlinked_at: None,
        };
        self.store.save_remote(unit, &remote)?;
        self.cache.invalidate(unit).await;
        info!("linked unit {unit} to {} remote {}", remote.backend_kind, remote.endpoint_url);
        Ok(())
    }

    /// Disables the unit's remote. With `delete_remote`, also removes the
    /// unit's mirrored objects; that deletion is best-effort and never fails
    /// the unlink.
    pub async fn unlink(&self, unit: &UnitId, delete_remote: bool) -> SyncResult<()> {
        let backend = if delete_remote {
            match self.cache.get_or_resolve(unit).await {
                Ok(backend) => backend,
                Err(e) => {
                    warn!("cannot reach remote of unit {unit} for deletion: {e}");
                    None
                }
            }
        } else {
            None
        };

        if !self.store.mark_unlinked(unit, self.clock.now())? {
            return Err(SyncError::NotLinked(unit.to_string()));
        }
        self.cache.invalidate(unit).await;
        info!("unlinked unit {unit}");

        if let Some(backend) = backend {
            match backend.replication_persistor() {
                Some(remote) => match remote.delete_directory(unit.as_str(), "").await {
                    Ok(()) => info!("deleted remote objects of unit {unit}"),
                    Err(e) => warn!("failed to delete remote objects of unit {unit}: {e}"),
                },
                None => info!("remote of unit {unit} holds no mirrored objects to delete"),
            }
        }
        Ok(())
    }

    /// Reconciles the whole unit now.
    pub async fn sync_now(&self, unit: &UnitId) -> SyncResult<SyncReport> {
        self.store.mark_syncing(unit)?;
        match self.persistor.sync_unit(unit).await {
            Ok(report) => {
                self.store.record_sync_success(unit, self.clock.now())?;
                Ok(report)
            }
            Err(e) => {
                self.store.record_sync_error(unit, &e.to_string())?;
                Err(e)
            }
        }
    }

    pub async fn create_snapshot(&self, unit: &UnitId) -> SyncResult<SnapshotOutcome> {
        self.engine.create_snapshot(unit).await
    }

    pub async fn list_backups(&self, unit: &UnitId) -> SyncResult<Vec<Snapshot>> {
        self.engine.list_backups(unit).await
    }

    pub async fn cleanup_backups(&self, unit: &UnitId) -> SyncResult<usize> {
        self.engine.cleanup_old_snapshots(unit).await
    }

    pub fn get_status(&self, unit: &UnitId) -> SyncResult<SyncStatus> {
        self.store.load_status(unit)
    }

    pub fn get_backup_policy(&self, unit: &UnitId) -> SyncResult<BackupPolicy> {
        self.store.load_policy(unit)
    }

    /// Applies a partial policy update; limits must be at least 1.
    pub fn set_backup_policy(
        &self,
        unit: &UnitId,
        update: &BackupPolicyUpdate,
    ) -> SyncResult<BackupPolicy> {
        self.store.update_policy(unit, update)
    }

    /// Feeds one modification event to the backup scheduler.
    pub async fn notify_modification(&self, unit: &UnitId) -> ScheduleOutcome {
        self.scheduler.on_modification(unit).await
    }

    /// Waits for background replication and scheduled backups.
    pub async fn wait_idle(&self) {
        self.persistor.wait_idle().await;
        self.scheduler.wait_idle().await;
    }
}
