//! Per-unit cache of resolved remotes.

use docsync_types::UnitId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::SyncResult;
use crate::provider::ConfigProvider;
use crate::remote::{RemoteBackend, RemoteConnector};

/// Lazily resolves each unit's remote once and keeps the result, including
/// "no remote", until [`invalidate`](Self::invalidate) or
/// [`clear`](Self::clear) is called. Resolution failures are not cached.
pub struct PersistorCache {
    provider: Arc<dyn ConfigProvider>,
    connector: Arc<dyn RemoteConnector>,
    entries: RwLock<HashMap<UnitId, Option<Arc<RemoteBackend>>>>,
}

impl PersistorCache {
    pub fn new(provider: Arc<dyn ConfigProvider>, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            provider,
            connector,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_or_resolve(&self, unit: &UnitId) -> SyncResult<Option<Arc<RemoteBackend>>> {
        if let Some(entry) = self.entries.read().await.get(unit) {
            return Ok(entry.clone());
        }

        let resolved = match self.provider.get_config(unit).await? {
            Some(target) if target.enabled => {
                Some(Arc::new(self.connector.connect(&target).await?))
            }
            _ => None,
        };
        debug!(
            "resolved remote for unit {unit}: {}",
            if resolved.is_some() { "linked" } else { "none" }
        );

        // A concurrent resolver may have won; keep whichever landed first.
        let mut entries = self.entries.write().await;
        Ok(entries.entry(unit.clone()).or_insert(resolved).clone())
    }

    /// Drops the cached remote of one unit.
    pub async fn invalidate(&self, unit: &UnitId) {
        if self.entries.write().await.remove(unit).is_some() {
            debug!("invalidated cached remote for unit {unit}");
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
