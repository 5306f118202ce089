use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of one stored object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStat {
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    /// Hex digest when the backend can provide one (SHA-256 or an ETag).
    pub content_hash: Option<String>,
}
