//! S3-compatible object store persistor.
//!
//! Objects live at `s3://<bucket>/<prefix>/<location>/<key>`. The source
//! modification time requested through [`PutOptions`] is kept in the
//! `docsync-mtime` user metadata and preferred over the server timestamp by
//! [`Persistor::stat`], so reconciled copies keep their source's age.

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::MetadataDirective;
use chrono::{DateTime, Utc};
use docsync_types::ObjectStat;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::path::{dir_prefix, join, validate_key};
use crate::persistor::{GetOptions, Persistor, PutOptions};

const MTIME_METADATA_KEY: &str = "docsync-mtime";

/// Connection settings for [`S3Persistor`].
#[derive(Clone)]
pub struct S3Settings {
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    /// Endpoint override for MinIO and other S3-compatible services.
    pub endpoint_override: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .field("endpoint_override", &self.endpoint_override)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl S3Settings {
    /// Splits a remote base path into bucket and key prefix
    /// (`/bucket/some/prefix` → `bucket`, `some/prefix`).
    pub fn split_base_path(base_path: &str) -> StorageResult<(String, String)> {
        let trimmed = base_path.trim_matches('/');
        let (bucket, prefix) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        if bucket.is_empty() {
            return Err(StorageError::Config(
                "S3 base path must start with a bucket name".to_string(),
            ));
        }
        Ok((bucket.to_string(), prefix.to_string()))
    }
}

/// Persistor backed by an S3 bucket.
pub struct S3Persistor {
    client: S3Client,
    bucket: String,
    prefix: String,
    timeout: Duration,
}

impl S3Persistor {
    pub fn new(settings: S3Settings) -> Self {
        let credentials = aws_credential_types::Credentials::new(
            &settings.access_key_id,
            &settings.secret_access_key,
            None,
            None,
            "docsync-static",
        );

        let mut config_builder = aws_sdk_s3::Config::builder()
            .region(aws_types::region::Region::new(settings.region.clone()))
            .credentials_provider(credentials)
            .behavior_version_latest();

        if let Some(ref endpoint) = settings.endpoint_override {
            config_builder = config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: settings.bucket,
            prefix: settings.prefix.trim_matches('/').to_string(),
            timeout: settings.timeout,
        }
    }

    fn object_key(&self, location: &str, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(join(&[&self.prefix, location, key]))
    }

    fn relative_key<'a>(&self, location: &str, full: &'a str) -> &'a str {
        let root = dir_prefix(&self.prefix, location, "");
        full.strip_prefix(root.as_str()).unwrap_or(full)
    }

    async fn timed<T>(&self, fut: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(self.timeout.as_secs()))?
    }

    async fn list_full_keys(&self, full_prefix: &str) -> StorageResult<Vec<aws_sdk_s3::types::Object>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let resp = self
                .timed(async {
                    self.client
                        .list_objects_v2()
                        .bucket(&self.bucket)
                        .prefix(full_prefix)
                        .set_continuation_token(continuation.clone())
                        .send()
                        .await
                        .map_err(|e| {
                            StorageError::read(full_prefix, format!("list failed: {e}"))
                        })
                })
                .await?;
            objects.extend(resp.contents().iter().cloned());
            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(objects)
    }
}

fn to_chrono(dt: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

#[async_trait]
impl Persistor for S3Persistor {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        opts: PutOptions,
    ) -> StorageResult<()> {
        let full = self.object_key(location, key)?;
        let size = data.len();
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&full)
            .body(ByteStream::from(data));
        if let Some(at) = opts.last_modified {
            request = request.metadata(MTIME_METADATA_KEY, at.to_rfc3339());
        }
        self.timed(async {
            request
                .send()
                .await
                .map_err(|e| StorageError::write(key, format!("upload failed: {e}")))
        })
        .await?;
        debug!("uploaded {size} bytes to s3://{}/{full}", self.bucket);
        Ok(())
    }

    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>> {
        let full = self.object_key(location, key)?;
        let resp = self
            .timed(async {
                self.client
                    .get_object()
                    .bucket(&self.bucket)
                    .key(&full)
                    .set_range(opts.header_value())
                    .send()
                    .await
                    .map_err(|e| {
                        let service_err = e.into_service_error();
                        if service_err.is_no_such_key() {
                            StorageError::not_found(location, key)
                        } else {
                            StorageError::read(key, format!("download failed: {service_err}"))
                        }
                    })
            })
            .await?;
        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::read(key, format!("failed to read body: {e}")))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat> {
        let full = self.object_key(location, key)?;
        let resp = self
            .timed(async {
                self.client
                    .head_object()
                    .bucket(&self.bucket)
                    .key(&full)
                    .send()
                    .await
                    .map_err(|e| {
                        let service_err = e.into_service_error();
                        if service_err.is_not_found() {
                            StorageError::not_found(location, key)
                        } else {
                            StorageError::read(key, format!("head object failed: {service_err}"))
                        }
                    })
            })
            .await?;

        let preserved = resp
            .metadata()
            .and_then(|m| m.get(MTIME_METADATA_KEY))
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let last_modified = preserved
            .or_else(|| resp.last_modified().and_then(to_chrono))
            .ok_or_else(|| StorageError::read(key, "missing last-modified"))?;

        Ok(ObjectStat {
            size: resp.content_length().unwrap_or(0).max(0) as u64,
            last_modified,
            content_hash: resp.e_tag().map(|e| e.trim_matches('"').to_string()),
        })
    }

    async fn delete(&self, location: &str, key: &str) -> StorageResult<()> {
        let full = self.object_key(location, key)?;
        self.timed(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&full)
                .send()
                .await
                .map_err(|e| StorageError::write(key, format!("delete failed: {e}")))
        })
        .await?;
        Ok(())
    }

    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()> {
        let full_prefix = dir_prefix(&self.prefix, location, prefix);
        let objects = self.list_full_keys(&full_prefix).await?;
        let count = objects.len();
        for object in objects {
            let Some(full) = object.key() else { continue };
            self.timed(async {
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(full)
                    .send()
                    .await
                    .map_err(|e| StorageError::write(full, format!("delete failed: {e}")))
            })
            .await?;
        }
        debug!("deleted {count} objects under s3://{}/{full_prefix}", self.bucket);
        Ok(())
    }

    async fn copy(&self, location: &str, from: &str, to: &str) -> StorageResult<()> {
        let src = self.object_key(location, from)?;
        let dst = self.object_key(location, to)?;
        let source = format!("{}/{}", self.bucket, urlencoding::encode(&src));
        self.timed(async {
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .key(&dst)
                .copy_source(source)
                .metadata_directive(MetadataDirective::Copy)
                .send()
                .await
                .map_err(|e| StorageError::write(to, format!("copy failed: {e}")))
        })
        .await?;
        Ok(())
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>> {
        let full_prefix = dir_prefix(&self.prefix, location, prefix);
        let objects = self.list_full_keys(&full_prefix).await?;
        Ok(objects
            .iter()
            .filter_map(|obj| {
                let full = obj.key()?;
                let stat = ObjectStat {
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_chrono)?,
                    content_hash: obj.e_tag().map(|e| e.trim_matches('"').to_string()),
                };
                Some((self.relative_key(location, full).to_string(), stat))
            })
            .collect())
    }

    async fn check_connection(&self) -> StorageResult<()> {
        self.timed(async {
            self.client
                .head_bucket()
                .bucket(&self.bucket)
                .send()
                .await
                .map_err(|e| {
                    StorageError::Connection(format!(
                        "bucket {} not reachable: {}",
                        self.bucket,
                        e.into_service_error()
                    ))
                })
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_split() {
        let (bucket, prefix) = S3Settings::split_base_path("/docs/projects/a/").unwrap();
        assert_eq!(bucket, "docs");
        assert_eq!(prefix, "projects/a");

        let (bucket, prefix) = S3Settings::split_base_path("docs").unwrap();
        assert_eq!(bucket, "docs");
        assert_eq!(prefix, "");

        assert!(S3Settings::split_base_path("/").is_err());
    }

    fn persistor(prefix: &str) -> S3Persistor {
        S3Persistor::new(S3Settings {
            bucket: "docs".to_string(),
            prefix: prefix.to_string(),
            region: "us-east-1".to_string(),
            endpoint_override: Some("http://127.0.0.1:9".to_string()),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
            timeout: Duration::from_secs(1),
        })
    }

    #[tokio::test]
    async fn object_keys_nest_under_prefix_and_location() {
        let p = persistor("/team/");
        assert_eq!(p.object_key("unit-1", "notes/a.md").unwrap(), "team/unit-1/notes/a.md");
        assert_eq!(persistor("").object_key("unit-1", "a.md").unwrap(), "unit-1/a.md");
        assert!(p.object_key("unit-1", "../unit-2/a.md").is_err());
    }

    #[tokio::test]
    async fn relative_key_strips_whole_location_segment() {
        let p = persistor("team");
        assert_eq!(p.relative_key("unit-1", "team/unit-1/notes/a.md"), "notes/a.md");
        assert_eq!(
            p.relative_key("backups/unit-1", "team/backups/unit-1/2026/readme.md"),
            "2026/readme.md"
        );
        // A sibling location sharing the name prefix is not stripped.
        assert_eq!(p.relative_key("unit-1", "team/unit-10/a.md"), "team/unit-10/a.md");
    }

    #[test]
    fn settings_debug_hides_secret() {
        let printed = format!(
            "{:?}",
            S3Settings {
                bucket: "docs".to_string(),
                prefix: String::new(),
                region: "us-east-1".to_string(),
                endpoint_override: None,
                access_key_id: "ak".to_string(),
                secret_access_key: "very-secret".to_string(),
                timeout: Duration::from_secs(1),
            }
        );
        assert!(!printed.contains("very-secret"));
    }
}
