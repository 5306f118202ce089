//! Snapshot containers on the secondary store.
//!
//! A [`SnapshotBackend`] creates, lists and deletes containers; a
//! [`SnapshotContainer`] receives entries and is finalized once. Directory
//! remotes keep each snapshot under `backups/<unit-id>/<snapshot-id>/`. Git
//! remotes keep each snapshot as a tagged commit on the target branch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_storage::{Persistor, PutOptions};
use docsync_types::{Snapshot, UnitId, snapshot_id_for};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::git::GitRemote;

/// Location that holds snapshot directories on directory-style remotes.
pub const BACKUPS_LOCATION: &str = "backups";

/// Rejects unit ids whose mirrored objects would overlap the snapshot
/// namespace or another unit's location.
pub fn validate_unit_id(unit: &UnitId) -> SyncResult<()> {
    let id = unit.as_str();
    if id.trim().is_empty() {
        return Err(SyncError::Validation("unit id is required".to_string()));
    }
    if id == BACKUPS_LOCATION || id == "." || id == ".." || id.contains(['/', '\\']) {
        return Err(SyncError::Validation(format!(
            "unit id {id:?} is reserved or not a single path segment"
        )));
    }
    Ok(())
}

/// Location of one unit's snapshot directories.
pub fn unit_backups_location(unit: &UnitId) -> SyncResult<String> {
    validate_unit_id(unit)?;
    Ok(format!("{BACKUPS_LOCATION}/{unit}"))
}

#[async_trait]
pub trait SnapshotBackend: Send + Sync {
    /// Opens a new, empty container for a snapshot taken at `created_at`.
    async fn create_container(
        &self,
        created_at: DateTime<Utc>,
    ) -> SyncResult<Box<dyn SnapshotContainer>>;

    /// Existing snapshots, newest first.
    async fn list_containers(&self) -> SyncResult<Vec<Snapshot>>;

    async fn delete_container(&self, snapshot: &Snapshot) -> SyncResult<()>;
}

#[async_trait]
pub trait SnapshotContainer: Send + Sync {
    /// Writes one entry at a slash-separated logical path.
    async fn put_entry(&self, path: &str, data: Vec<u8>) -> SyncResult<()>;

    /// Completes the snapshot. `None` means nothing changed since the last
    /// snapshot and no new one was recorded.
    async fn finalize(self: Box<Self>) -> SyncResult<Option<Snapshot>>;
}

fn newest_first(mut snapshots: Vec<Snapshot>) -> Vec<Snapshot> {
    snapshots.sort_by(|a, b| b.id.cmp(&a.id));
    snapshots
}

// ── Directory-style ──────────────────────────────────────────────

/// One unit's snapshots as directories on a mirroring persistor.
pub struct DirectorySnapshots {
    persistor: Arc<dyn Persistor>,
    unit: UnitId,
}

impl DirectorySnapshots {
    pub fn new(persistor: Arc<dyn Persistor>, unit: UnitId) -> Self {
        Self { persistor, unit }
    }
}

#[async_trait]
impl SnapshotBackend for DirectorySnapshots {
    async fn create_container(
        &self,
        created_at: DateTime<Utc>,
    ) -> SyncResult<Box<dyn SnapshotContainer>> {
        let location = unit_backups_location(&self.unit)?;
        let id = snapshot_id_for(created_at);
        debug!("opening snapshot directory {location}/{id}");
        Ok(Box::new(DirectoryContainer {
            persistor: Arc::clone(&self.persistor),
            location,
            id,
            created_at,
        }))
    }

    async fn list_containers(&self) -> SyncResult<Vec<Snapshot>> {
        let location = unit_backups_location(&self.unit)?;
        let keys = self.persistor.list_keys(&location, "").await?;
        let ids: BTreeSet<&str> = keys
            .iter()
            .filter_map(|key| key.split('/').next())
            .collect();
        Ok(newest_first(
            ids.into_iter()
                .filter_map(|id| Snapshot::from_id(id, format!("{location}/{id}")))
                .collect(),
        ))
    }

    async fn delete_container(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let location = unit_backups_location(&self.unit)?;
        self.persistor
            .delete_directory(&location, &snapshot.id)
            .await?;
        Ok(())
    }
}

struct DirectoryContainer {
    persistor: Arc<dyn Persistor>,
    location: String,
    id: String,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl SnapshotContainer for DirectoryContainer {
    async fn put_entry(&self, path: &str, data: Vec<u8>) -> SyncResult<()> {
        let key = format!("{}/{}", self.id, path.trim_start_matches('/'));
        self.persistor
            .put(&self.location, &key, data, PutOptions::default())
            .await?;
        Ok(())
    }

    async fn finalize(self: Box<Self>) -> SyncResult<Option<Snapshot>> {
        Ok(Some(Snapshot {
            location: format!("{}/{}", self.location, self.id),
            id: self.id,
            created_at: self.created_at,
        }))
    }
}

// ── Version control ──────────────────────────────────────────────

/// Snapshots as tagged commits on a git remote.
pub struct GitSnapshots {
    git: GitRemote,
}

impl GitSnapshots {
    pub fn new(git: GitRemote) -> Self {
        Self { git }
    }
}

/// Resolves a logical entry path inside `root`, rejecting escapes.
fn entry_path(root: &Path, path: &str) -> SyncResult<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(SyncError::Validation(format!("invalid entry path: {path}")));
    }
    Ok(root.join(relative))
}

/// Removes everything in the content directory except git metadata, so the
/// snapshot mirrors the current tree rather than accumulating old entries.
async fn clear_content(workdir: &Path, content: &Path) -> SyncResult<()> {
    let mut entries = match tokio::fs::read_dir(content).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(SyncError::Git(format!("failed to read working tree: {e}"))),
    };
    let io = |e: std::io::Error| SyncError::Git(format!("failed to clear working tree: {e}"));
    while let Some(entry) = entries.next_entry().await.map_err(io)? {
        let path = entry.path();
        if path == workdir.join(".git") {
            continue;
        }
        if entry.file_type().await.map_err(io)?.is_dir() {
            tokio::fs::remove_dir_all(&path).await.map_err(io)?;
        } else {
            tokio::fs::remove_file(&path).await.map_err(io)?;
        }
    }
    Ok(())
}

#[async_trait]
impl SnapshotBackend for GitSnapshots {
    async fn create_container(
        &self,
        created_at: DateTime<Utc>,
    ) -> SyncResult<Box<dyn SnapshotContainer>> {
        let workdir = self.git.scratch()?;
        self.git.checkout(workdir.path()).await?;

        let content_root = if self.git.content_dir().is_empty() {
            workdir.path().to_path_buf()
        } else {
            workdir.path().join(self.git.content_dir())
        };
        clear_content(workdir.path(), &content_root).await?;

        Ok(Box::new(GitContainer {
            git: self.git.clone(),
            id: snapshot_id_for(created_at),
            created_at,
            content_root,
            workdir,
        }))
    }

    async fn list_containers(&self) -> SyncResult<Vec<Snapshot>> {
        let prefix = self.git.tag_prefix();
        let tags = self.git.list_backup_tags().await?;
        Ok(newest_first(
            tags.iter()
                .filter_map(|tag| {
                    let id = tag.strip_prefix(prefix)?;
                    Snapshot::from_id(id, tag.clone())
                })
                .collect(),
        ))
    }

    async fn delete_container(&self, snapshot: &Snapshot) -> SyncResult<()> {
        self.git.delete_tag(&snapshot.location).await
    }
}

/// Working tree of one git snapshot. The scratch directory is removed when
/// the container is dropped, on every path.
struct GitContainer {
    git: GitRemote,
    id: String,
    created_at: DateTime<Utc>,
    content_root: PathBuf,
    workdir: TempDir,
}

#[async_trait]
impl SnapshotContainer for GitContainer {
    async fn put_entry(&self, path: &str, data: Vec<u8>) -> SyncResult<()> {
        let target = entry_path(&self.content_root, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Git(format!("failed to create {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&target, data)
            .await
            .map_err(|e| SyncError::Git(format!("failed to write {path}: {e}")))
    }

    async fn finalize(self: Box<Self>) -> SyncResult<Option<Snapshot>> {
        let dir = self.workdir.path();
        self.git.stage_all(dir).await?;
        if !self.git.has_changes(dir).await? {
            info!("no changes to commit for snapshot {}", self.id);
            return Ok(None);
        }

        let message = format!("Backup {}", self.created_at.to_rfc3339());
        let tag = format!("{}{}", self.git.tag_prefix(), self.id);
        self.git.commit(dir, &message).await?;
        self.git.tag(dir, &tag).await?;
        self.git.push(dir, &tag).await?;
        info!("pushed snapshot {tag} to branch {}", self.git.branch());

        Ok(Some(Snapshot {
            id: self.id,
            created_at: self.created_at,
            location: tag,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_paths_stay_inside_root() {
        let root = Path::new("/work");
        assert_eq!(
            entry_path(root, "notes/a.md").unwrap(),
            PathBuf::from("/work/notes/a.md")
        );
        assert_eq!(entry_path(root, "/a.md").unwrap(), PathBuf::from("/work/a.md"));
        assert!(entry_path(root, "../escape").is_err());
        assert!(entry_path(root, "a/./b").is_ok());
        assert!(entry_path(root, "").is_err());
    }

    #[test]
    fn unit_ids_cannot_alias_snapshot_locations() {
        assert_eq!(
            unit_backups_location(&UnitId::new("unit-a")).unwrap(),
            "backups/unit-a"
        );
        for bad in ["backups", "a/b", "..", "", "a\\b"] {
            assert!(unit_backups_location(&UnitId::new(bad)).is_err(), "{bad}");
        }
    }
}
