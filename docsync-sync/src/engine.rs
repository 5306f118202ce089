//! Snapshot creation, listing and retention.

use docsync_types::{Folder, Snapshot, UnitId};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::PersistorCache;
use crate::clock::Clock;
use crate::error::{SyncError, SyncResult};
use crate::provider::TreeProvider;
use crate::remote::RemoteBackend;
use crate::snapshot::SnapshotContainer;
use crate::unit_store::UnitStore;

/// Where an entry's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    Document { id: String },
    File { id: String, hash: String },
}

/// Result of [`BackupEngine::create_snapshot`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Created {
        snapshot: Snapshot,
        transferred: usize,
        failed: usize,
    },
    /// Version-control remote whose content already matches the last
    /// snapshot; nothing was committed or tagged.
    NoChanges,
}

/// Flattens a content tree into `(logical_path, source)` pairs. The root
/// folder's own name is not part of the paths; files without a hash are
/// skipped.
pub fn collect_entries(root: &Folder) -> Vec<(String, ContentSource)> {
    fn walk(folder: &Folder, prefix: &str, out: &mut Vec<(String, ContentSource)>) {
        let path = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            }
        };
        for doc in &folder.docs {
            out.push((path(&doc.name), ContentSource::Document { id: doc.id.clone() }));
        }
        for file in &folder.files {
            if let Some(hash) = &file.hash {
                out.push((
                    path(&file.name),
                    ContentSource::File {
                        id: file.id.clone(),
                        hash: hash.clone(),
                    },
                ));
            }
        }
        for sub in &folder.folders {
            walk(sub, &path(&sub.name), out);
        }
    }

    let mut out = Vec::new();
    walk(root, "", &mut out);
    out
}

/// Takes and prunes snapshots of units on their remotes.
pub struct BackupEngine {
    store: UnitStore,
    cache: Arc<PersistorCache>,
    tree: Arc<dyn TreeProvider>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
}

impl BackupEngine {
    pub fn new(
        store: UnitStore,
        cache: Arc<PersistorCache>,
        tree: Arc<dyn TreeProvider>,
        clock: Arc<dyn Clock>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            cache,
            tree,
            clock,
            concurrency: concurrency.max(1),
        }
    }

    async fn remote(&self, unit: &UnitId) -> SyncResult<Arc<RemoteBackend>> {
        self.cache
            .get_or_resolve(unit)
            .await?
            .ok_or_else(|| SyncError::NotLinked(unit.to_string()))
    }

    /// Takes a snapshot of the unit's current content tree. Any failure,
    /// including resolving the remote, is recorded as `last_sync_error` and
    /// clears `is_syncing`.
    pub async fn create_snapshot(&self, unit: &UnitId) -> SyncResult<SnapshotOutcome> {
        let result = self.run_snapshot(unit).await;
        if let Err(e) = &result {
            error!("snapshot of unit {unit} failed: {e}");
            if let Err(status_err) = self.store.record_sync_error(unit, &e.to_string()) {
                warn!("failed to record snapshot error for unit {unit}: {status_err}");
            }
        }
        result
    }

    async fn run_snapshot(&self, unit: &UnitId) -> SyncResult<SnapshotOutcome> {
        let backend = self.remote(unit).await?;
        self.store.mark_syncing(unit)?;

        let outcome = self.build_snapshot(unit, &backend).await?;
        let now = self.clock.now();
        if matches!(outcome, SnapshotOutcome::Created { .. }) {
            self.store.record_backup(unit, now)?;
        }
        self.store.record_sync_success(unit, now)?;
        Ok(outcome)
    }

    async fn build_snapshot(
        &self,
        unit: &UnitId,
        backend: &RemoteBackend,
    ) -> SyncResult<SnapshotOutcome> {
        let tree = self.tree.get_tree(unit).await?;
        let entries = collect_entries(&tree);
        debug!("unit {unit}: {} entries to snapshot", entries.len());

        let container = backend
            .snapshot_backend(unit)
            .create_container(self.clock.now())
            .await?;

        let results: Vec<bool> = stream::iter(entries)
            .map(|(path, source)| {
                let container = container.as_ref();
                async move {
                    match self.transfer_entry(unit, container, &path, &source).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("skipping {path} in snapshot of unit {unit}: {e}");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        let transferred = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - transferred;

        match container.finalize().await? {
            Some(snapshot) => {
                info!(
                    "created snapshot {} for unit {unit} ({transferred} entries, {failed} failed)",
                    snapshot.id
                );
                Ok(SnapshotOutcome::Created {
                    snapshot,
                    transferred,
                    failed,
                })
            }
            None => Ok(SnapshotOutcome::NoChanges),
        }
    }

    async fn transfer_entry(
        &self,
        unit: &UnitId,
        container: &dyn SnapshotContainer,
        path: &str,
        source: &ContentSource,
    ) -> SyncResult<()> {
        let data = match source {
            ContentSource::Document { id } => self
                .tree
                .get_document_content(unit, id)
                .await?
                .into_bytes(),
            ContentSource::File { id, hash } => {
                self.tree.get_file_stream(unit, id, hash).await?
            }
        };
        container.put_entry(path, data).await
    }

    /// Snapshots on the unit's remote, newest first.
    pub async fn list_backups(&self, unit: &UnitId) -> SyncResult<Vec<Snapshot>> {
        let backend = self.remote(unit).await?;
        let mut snapshots = backend.snapshot_backend(unit).list_containers().await?;
        snapshots.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(snapshots)
    }

    /// Deletes snapshots beyond the unit's `max_backups`, oldest first.
    /// Returns how many were actually deleted.
    pub async fn cleanup_old_snapshots(&self, unit: &UnitId) -> SyncResult<usize> {
        let backend = self.remote(unit).await?;
        let max_backups = self.store.load_policy(unit)?.max_backups as usize;
        let snapshots_backend = backend.snapshot_backend(unit);

        let mut snapshots = snapshots_backend.list_containers().await?;
        if snapshots.len() <= max_backups {
            return Ok(0);
        }
        snapshots.sort_by(|a, b| b.id.cmp(&a.id));

        let mut deleted = 0;
        for snapshot in snapshots[max_backups..].iter().rev() {
            match snapshots_backend.delete_container(snapshot).await {
                Ok(()) => {
                    debug!("deleted snapshot {} of unit {unit}", snapshot.id);
                    deleted += 1;
                }
                Err(e) => warn!("failed to delete snapshot {} of unit {unit}: {e}", snapshot.id),
            }
        }
        info!("retention for unit {unit}: deleted {deleted} of {} old snapshots", snapshots.len() - max_backups);
        Ok(deleted)
    }
}
