//! The persistor capability contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_types::ObjectStat;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::StorageResult;

/// Options for [`Persistor::put`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Modification time to stamp on the stored object. Backends that cannot
    /// set it (WebDAV) ignore it and use their own clock.
    pub last_modified: Option<DateTime<Utc>>,
}

impl PutOptions {
    pub fn preserving(last_modified: DateTime<Utc>) -> Self {
        Self {
            last_modified: Some(last_modified),
        }
    }
}

/// Options for [`Persistor::get`]. `end` is inclusive, like an HTTP range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl GetOptions {
    pub fn range(start: u64, end: u64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Renders the `Range` header value, if any.
    pub fn header_value(&self) -> Option<String> {
        match (self.start, self.end) {
            (None, None) => None,
            (start, Some(end)) => Some(format!("bytes={}-{end}", start.unwrap_or(0))),
            (Some(start), None) => Some(format!("bytes={start}-")),
        }
    }
}

/// Applies a byte range to a fully-read object.
pub fn slice_range(data: Vec<u8>, opts: GetOptions) -> Vec<u8> {
    if opts.is_full() {
        return data;
    }
    let len = data.len() as u64;
    let start = opts.start.unwrap_or(0).min(len) as usize;
    let end = opts
        .end
        .map(|e| e.saturating_add(1).min(len))
        .unwrap_or(len) as usize;
    if start >= end {
        return Vec::new();
    }
    data[start..end].to_vec()
}

/// SHA-256 hex digest used as content hash by local backends.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Object storage capability set implemented once per backend.
///
/// Keys are relative to their location. Listing is recursive under a logical
/// directory prefix and returns keys relative to the location.
#[async_trait]
pub trait Persistor: Send + Sync {
    /// Short backend name for log records.
    fn name(&self) -> &'static str;

    /// Stores content, overwriting any existing object.
    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        opts: PutOptions,
    ) -> StorageResult<()>;

    /// Reads content, optionally a byte range.
    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>>;

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat>;

    /// Returns whether the object exists. Never fails; errors other than
    /// not-found are logged and reported as absent.
    async fn exists(&self, location: &str, key: &str) -> bool {
        match self.stat(location, key).await {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                warn!("{} exists check failed for {location}/{key}: {e}", self.name());
                false
            }
        }
    }

    /// Deletes one object. Absence is not an error.
    async fn delete(&self, location: &str, key: &str) -> StorageResult<()>;

    /// Recursively deletes everything under `prefix` ("" for the whole
    /// location). Absence is not an error.
    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()>;

    /// Copies an object inside one location. Backends without server-side
    /// copy read and re-write it, keeping the source modification time.
    async fn copy(&self, location: &str, from: &str, to: &str) -> StorageResult<()> {
        let stat = self.stat(location, from).await?;
        let data = self.get(location, from, GetOptions::default()).await?;
        self.put(location, to, data, PutOptions::preserving(stat.last_modified))
            .await
    }

    async fn list_keys(&self, location: &str, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .list_stats(location, prefix)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>>;

    /// Verifies the backend is reachable and the credentials are accepted.
    async fn check_connection(&self) -> StorageResult<()>;
}
