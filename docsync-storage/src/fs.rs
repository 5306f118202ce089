//! Local filesystem persistor.
//!
//! Objects live at `<root>/<location>/<key>`. Used as the primary store and
//! for filesystem-class remotes (a mounted share).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_types::ObjectStat;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::path::validate_key;
use crate::persistor::{GetOptions, Persistor, PutOptions, sha256_hex, slice_range};

/// Persistor rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsPersistor {
    root: PathBuf,
}

impl FsPersistor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location_dir(&self, location: &str) -> StorageResult<PathBuf> {
        if !location.is_empty() {
            validate_key(location)?;
        }
        Ok(self.root.join(location))
    }

    fn object_path(&self, location: &str, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.location_dir(location)?.join(key))
    }
}

async fn set_mtime(path: &Path, at: DateTime<Utc>) -> std::io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::options().write(true).open(&path)?;
        file.set_modified(SystemTime::from(at))
    })
    .await
    .map_err(std::io::Error::other)?
}

async fn stat_path(path: &Path, location: &str, key: &str) -> StorageResult<ObjectStat> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(StorageError::not_found(location, key)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(StorageError::not_found(location, key));
        }
        Err(e) => return Err(StorageError::read(key, e)),
    };
    let modified = meta.modified().map_err(|e| StorageError::read(key, e))?;
    let data = tokio::fs::read(path)
        .await
        .map_err(|e| StorageError::read(key, e))?;
    Ok(ObjectStat {
        size: meta.len(),
        last_modified: DateTime::<Utc>::from(modified),
        content_hash: Some(sha256_hex(&data)),
    })
}

#[async_trait]
impl Persistor for FsPersistor {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        opts: PutOptions,
    ) -> StorageResult<()> {
        let path = self.object_path(location, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::write(key, e))?;
        }
        let size = data.len();
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::write(key, e))?;
        if let Some(at) = opts.last_modified {
            set_mtime(&path, at)
                .await
                .map_err(|e| StorageError::write(key, format!("set mtime: {e}")))?;
        }
        debug!("wrote {size} bytes to {}", path.display());
        Ok(())
    }

    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>> {
        let path = self.object_path(location, key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(slice_range(data, opts)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::not_found(location, key))
            }
            Err(e) => Err(StorageError::read(key, e)),
        }
    }

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat> {
        let path = self.object_path(location, key)?;
        stat_path(&path, location, key).await
    }

    async fn delete(&self, location: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(location, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::write(key, e)),
        }
    }

    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()> {
        let prefix = prefix.trim_matches('/');
        let dir = if prefix.is_empty() {
            self.location_dir(location)?
        } else {
            self.object_path(location, prefix)?
        };
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::write(prefix, e)),
        }
    }

    async fn copy(&self, location: &str, from: &str, to: &str) -> StorageResult<()> {
        let src = self.object_path(location, from)?;
        let dst = self.object_path(location, to)?;
        let stat = stat_path(&src, location, from).await?;
        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::write(to, e))?;
        }
        tokio::fs::copy(&src, &dst)
            .await
            .map_err(|e| StorageError::write(to, e))?;
        set_mtime(&dst, stat.last_modified)
            .await
            .map_err(|e| StorageError::write(to, format!("set mtime: {e}")))
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>> {
        let base = self.location_dir(location)?;
        let prefix = prefix.trim_matches('/');
        let start = if prefix.is_empty() {
            base.clone()
        } else {
            self.object_path(location, prefix)?
        };

        let mut out = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::read(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::read(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::read(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&base) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let stat = stat_path(&path, location, &key).await?;
                out.push((key, stat));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    async fn check_connection(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Connection(format!("{}: {e}", self.root.display())))?;
        let meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| StorageError::Connection(format!("{}: {e}", self.root.display())))?;
        if !meta.is_dir() {
            return Err(StorageError::Connection(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}
