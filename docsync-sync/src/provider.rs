//! Collaborators the sync layer consumes: remote configuration and content.

use async_trait::async_trait;
use docsync_crypto::CredentialVault;
use docsync_types::{Folder, RemoteTarget, UnitId};
use tracing::debug;

use crate::error::SyncResult;
use crate::unit_store::UnitStore;

/// Resolves the decrypted remote configuration of a unit.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Returns `None` when the unit has no enabled remote.
    async fn get_config(&self, unit: &UnitId) -> SyncResult<Option<RemoteTarget>>;
}

/// Read access to a unit's content tree.
#[async_trait]
pub trait TreeProvider: Send + Sync {
    async fn get_tree(&self, unit: &UnitId) -> SyncResult<Folder>;

    async fn get_document_content(&self, unit: &UnitId, doc_id: &str) -> SyncResult<String>;

    async fn get_file_stream(
        &self,
        unit: &UnitId,
        file_id: &str,
        hash: &str,
    ) -> SyncResult<Vec<u8>>;
}

/// [`ConfigProvider`] reading [`UnitStore`] and decrypting with the vault.
pub struct StoredConfigProvider {
    store: UnitStore,
    vault: CredentialVault,
}

impl StoredConfigProvider {
    pub fn new(store: UnitStore, vault: CredentialVault) -> Self {
        Self { store, vault }
    }
}

#[async_trait]
impl ConfigProvider for StoredConfigProvider {
    async fn get_config(&self, unit: &UnitId) -> SyncResult<Option<RemoteTarget>> {
        let Some(remote) = self.store.load_remote(unit)? else {
            return Ok(None);
        };
        if !remote.enabled {
            debug!("remote for unit {unit} is disabled");
            return Ok(None);
        }
        let secret = if remote.encrypted_secret.is_empty() {
            String::new()
        } else {
            self.vault.decrypt(&remote.encrypted_secret)?
        };
        Ok(Some(RemoteTarget {
            backend_kind: remote.backend_kind,
            endpoint_url: remote.endpoint_url,
            username: remote.username,
            secret,
            base_path: remote.base_path,
            enabled: remote.enabled,
        }))
    }
}
