//! Key validation and joining shared by the backends.

use crate::error::{StorageError, StorageResult};

/// Rejects keys that could escape their location.
pub(crate) fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("empty key".to_string()));
    }
    if key.starts_with('/') || key.split('/').any(|seg| seg == ".." || seg == ".") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Joins non-empty segments with single slashes.
pub(crate) fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Joins a location and a directory prefix, keeping a trailing slash so the
/// result only matches whole directory names.
pub(crate) fn dir_prefix(root: &str, location: &str, prefix: &str) -> String {
    let joined = join(&[root, location, prefix]);
    if joined.is_empty() {
        joined
    } else {
        format!("{joined}/")
    }
}
