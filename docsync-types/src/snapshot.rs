use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retained point-in-time copy of a unit on the secondary store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Timestamp-derived id; lexicographic order is chronological order.
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Directory path on a directory-style remote, or tag name on a
    /// version-control remote.
    pub location: String,
}

const SNAPSHOT_ID_FORMAT: &str = "%Y-%m-%dT%H-%M-%S-%3fZ";

/// Builds the snapshot id for a creation time, e.g. `2026-10-17T09-30-05-042Z`.
///
/// Colons are avoided so the id is usable as a directory name and a git tag.
pub fn snapshot_id_for(at: DateTime<Utc>) -> String {
    at.format(SNAPSHOT_ID_FORMAT).to_string()
}

impl Snapshot {
    /// Parses the creation time back out of a snapshot id.
    pub fn parse_id(id: &str) -> Option<DateTime<Utc>> {
        chrono::NaiveDateTime::parse_from_str(id, SNAPSHOT_ID_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// Builds a snapshot from an id found on the remote, if it follows the
    /// naming convention.
    pub fn from_id(id: &str, location: impl Into<String>) -> Option<Self> {
        Self::parse_id(id).map(|created_at| Self {
            id: id.to_string(),
            created_at,
            location: location.into(),
        })
    }
}
