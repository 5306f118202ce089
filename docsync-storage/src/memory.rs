//! In-process persistor.
//!
//! Keeps objects in a map guarded by a tokio `RwLock`. Modification times
//! come from [`PutOptions::last_modified`] when given, so callers can stage
//! precise timestamp scenarios.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_types::ObjectStat;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::error::{StorageError, StorageResult};
use crate::path::validate_key;
use crate::persistor::{GetOptions, Persistor, PutOptions, sha256_hex, slice_range};

#[derive(Clone, Debug)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: DateTime<Utc>,
}

/// Map-backed persistor.
#[derive(Debug, Default)]
pub struct MemoryPersistor {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl MemoryPersistor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object with an explicit modification time.
    pub async fn insert_at(
        &self,
        location: &str,
        key: &str,
        data: impl Into<Vec<u8>>,
        last_modified: DateTime<Utc>,
    ) {
        self.objects.write().await.insert(
            (location.to_string(), key.to_string()),
            StoredObject {
                data: data.into(),
                last_modified,
            },
        );
    }

    /// Returns the content of an object, if present.
    pub async fn content(&self, location: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(location.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Number of stored objects across all locations.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

fn under_prefix(key: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    prefix.is_empty() || key == prefix || key.starts_with(&format!("{prefix}/"))
}

#[async_trait]
impl Persistor for MemoryPersistor {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        opts: PutOptions,
    ) -> StorageResult<()> {
        validate_key(key)?;
        let last_modified = opts.last_modified.unwrap_or_else(Utc::now);
        self.insert_at(location, key, data, last_modified).await;
        Ok(())
    }

    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>> {
        let data = self
            .content(location, key)
            .await
            .ok_or_else(|| StorageError::not_found(location, key))?;
        Ok(slice_range(data, opts))
    }

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat> {
        let objects = self.objects.read().await;
        let object = objects
            .get(&(location.to_string(), key.to_string()))
            .ok_or_else(|| StorageError::not_found(location, key))?;
        Ok(ObjectStat {
            size: object.data.len() as u64,
            last_modified: object.last_modified,
            content_hash: Some(sha256_hex(&object.data)),
        })
    }

    async fn delete(&self, location: &str, key: &str) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .remove(&(location.to_string(), key.to_string()));
        Ok(())
    }

    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .retain(|(loc, key), _| !(loc == location && under_prefix(key, prefix)));
        Ok(())
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>> {
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((loc, key), _)| loc == location && under_prefix(key, prefix))
            .map(|((_, key), object)| {
                (
                    key.clone(),
                    ObjectStat {
                        size: object.data.len() as u64,
                        last_modified: object.last_modified,
                        content_hash: Some(sha256_hex(&object.data)),
                    },
                )
            })
            .collect())
    }

    async fn check_connection(&self) -> StorageResult<()> {
        Ok(())
    }
}
