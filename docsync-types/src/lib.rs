//! Shared types for docsync.
//!
//! A *unit* (a project) is the container that gets mirrored to a secondary
//! store and periodically snapshotted. Every unit carries one
//! [`RemoteConfig`], one [`SyncStatus`] and one [`BackupPolicy`]. Snapshots
//! live on the remote side and are discovered by listing.

mod object;
mod policy;
mod remote;
mod snapshot;
mod tree;

pub use object::ObjectStat;
pub use policy::{BackupPolicy, BackupPolicyUpdate};
pub use remote::{BackendClass, BackendKind, RemoteConfig, RemoteTarget};
pub use snapshot::{Snapshot, snapshot_id_for};
pub use tree::{DocEntry, FileEntry, Folder};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(pub String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Replication / backup status of a unit.
///
/// Updated before and after every sync or backup attempt. `is_syncing` is
/// advisory only; nothing uses it as a lock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_sync_error: Option<String>,
}
