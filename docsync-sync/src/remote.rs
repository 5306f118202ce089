//! Secondary-store backends, one variant per backend class.

use async_trait::async_trait;
use docsync_storage::{FsPersistor, Persistor, S3Persistor, S3Settings, WebDavPersistor};
use docsync_types::{BackendClass, BackendKind, RemoteTarget, UnitId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::git::GitRemote;
use crate::snapshot::{DirectorySnapshots, GitSnapshots, SnapshotBackend};

/// A connected remote.
///
/// Filesystem-like and object-store-like remotes mirror objects and keep
/// snapshots as directories. Version-control remotes only take snapshots.
#[derive(Clone)]
pub enum RemoteBackend {
    FilesystemLike(Arc<dyn Persistor>),
    ObjectStoreLike(Arc<dyn Persistor>),
    VersionControlLike(GitRemote),
}

impl std::fmt::Debug for RemoteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteBackend::FilesystemLike(p) => write!(f, "FilesystemLike({})", p.name()),
            RemoteBackend::ObjectStoreLike(p) => write!(f, "ObjectStoreLike({})", p.name()),
            RemoteBackend::VersionControlLike(git) => write!(f, "VersionControlLike({git:?})"),
        }
    }
}

impl RemoteBackend {
    pub fn class(&self) -> BackendClass {
        match self {
            RemoteBackend::FilesystemLike(_) => BackendClass::FilesystemLike,
            RemoteBackend::ObjectStoreLike(_) => BackendClass::ObjectStoreLike,
            RemoteBackend::VersionControlLike(_) => BackendClass::VersionControlLike,
        }
    }

    /// The persistor objects are mirrored to, if this remote mirrors.
    pub fn replication_persistor(&self) -> Option<Arc<dyn Persistor>> {
        match self {
            RemoteBackend::FilesystemLike(p) | RemoteBackend::ObjectStoreLike(p) => {
                Some(Arc::clone(p))
            }
            RemoteBackend::VersionControlLike(_) => None,
        }
    }

    /// Snapshot backend for one unit. Directory-style snapshots are kept
    /// per unit; a git remote holds one unit's history.
    pub fn snapshot_backend(&self, unit: &UnitId) -> Box<dyn SnapshotBackend> {
        match self {
            RemoteBackend::FilesystemLike(p) | RemoteBackend::ObjectStoreLike(p) => {
                Box::new(DirectorySnapshots::new(Arc::clone(p), unit.clone()))
            }
            RemoteBackend::VersionControlLike(git) => Box::new(GitSnapshots::new(git.clone())),
        }
    }

    pub async fn check_connection(&self) -> SyncResult<()> {
        match self {
            RemoteBackend::FilesystemLike(p) | RemoteBackend::ObjectStoreLike(p) => {
                p.check_connection().await.map_err(SyncError::from_connect)
            }
            RemoteBackend::VersionControlLike(git) => git.check_connection().await,
        }
    }
}

/// Builds a [`RemoteBackend`] from a decrypted target.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self, target: &RemoteTarget) -> SyncResult<RemoteBackend>;
}

/// Connector for the built-in backends.
#[derive(Debug, Clone, Default)]
pub struct DefaultConnector {
    config: SyncConfig,
}

impl DefaultConnector {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }
}

/// Local directory for a filesystem remote: endpoint (path or `file://`
/// URL) joined with the base path.
fn filesystem_root(target: &RemoteTarget) -> PathBuf {
    let endpoint = target.endpoint_url.trim();
    let endpoint = endpoint.strip_prefix("file://").unwrap_or(endpoint);
    let mut root = PathBuf::from(endpoint);
    let base = target.normalized_base_path();
    if !base.is_empty() {
        root.push(base);
    }
    root
}

#[async_trait]
impl RemoteConnector for DefaultConnector {
    async fn connect(&self, target: &RemoteTarget) -> SyncResult<RemoteBackend> {
        let timeout = self.config.request_timeout();
        let backend = match target.backend_kind {
            BackendKind::Filesystem => {
                RemoteBackend::FilesystemLike(Arc::new(FsPersistor::new(filesystem_root(target))))
            }
            BackendKind::WebDav => RemoteBackend::FilesystemLike(Arc::new(WebDavPersistor::new(
                &target.endpoint_url,
                &target.base_path,
                &target.username,
                &target.secret,
                timeout,
            )?)),
            BackendKind::S3 => {
                let (bucket, prefix) = S3Settings::split_base_path(&target.base_path)?;
                let endpoint = target.endpoint_url.trim();
                let settings = S3Settings {
                    bucket,
                    prefix,
                    region: self.config.s3_region.clone(),
                    endpoint_override: (!endpoint.is_empty()).then(|| endpoint.to_string()),
                    access_key_id: target.username.clone(),
                    secret_access_key: target.secret.clone(),
                    timeout,
                };
                RemoteBackend::ObjectStoreLike(Arc::new(S3Persistor::new(settings)))
            }
            BackendKind::Git => {
                RemoteBackend::VersionControlLike(GitRemote::new(target, &self.config))
            }
        };
        info!("connected {} remote {backend:?}", target.backend_kind);
        Ok(backend)
    }
}
