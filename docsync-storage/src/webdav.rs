//! WebDAV persistor.
//!
//! Objects live at `<endpoint>/<base_path>/<location>/<key>`. Missing parent
//! collections are created with MKCOL before writes. Listing walks the
//! collection tree with `Depth: 1` PROPFIND requests since many servers
//! refuse `Depth: infinity`.
//!
//! WebDAV exposes `getlastmodified` as a protected property, so
//! [`PutOptions::last_modified`] is ignored here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_types::ObjectStat;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{StorageError, StorageResult};
use crate::path::{join, validate_key};
use crate::persistor::{GetOptions, Persistor, PutOptions};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/><d:getcontentlength/><d:getlastmodified/><d:getetag/></d:prop></d:propfind>"#;

/// Persistor speaking WebDAV over HTTP(S) with basic auth.
pub struct WebDavPersistor {
    client: Client,
    endpoint: String,
    base_path: String,
    username: String,
    password: String,
    timeout_secs: u64,
}

impl WebDavPersistor {
    pub fn new(
        endpoint: &str,
        base_path: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(StorageError::Config(format!(
                "WebDAV endpoint must be an http(s) URL: {endpoint}"
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint,
            base_path: base_path.trim_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if encoded.is_empty() {
            format!("{}/", self.endpoint)
        } else {
            format!("{}/{encoded}", self.endpoint)
        }
    }

    fn object_path(&self, location: &str, key: &str) -> StorageResult<String> {
        validate_key(key)?;
        Ok(join(&[&self.base_path, location, key]))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, builder: RequestBuilder) -> StorageResult<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StorageError::Timeout(self.timeout_secs)
            } else {
                StorageError::Connection(e.to_string())
            }
        })?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            return Err(StorageError::Connection(format!(
                "authentication rejected ({})",
                response.status()
            )));
        }
        Ok(response)
    }

    /// Creates every collection on the way to `dir`, ignoring ones that exist.
    async fn ensure_collections(&self, dir: &str) -> StorageResult<()> {
        let mut current = String::new();
        for segment in dir.split('/').filter(|s| !s.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            let url = format!("{}/", self.url_for(&current));
            let response = self
                .send(self.request(dav_method("MKCOL")?, &url))
                .await?;
            let status = response.status();
            // 405: already exists
            if !(status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED) {
                return Err(StorageError::write(
                    &current,
                    format!("MKCOL returned {status}"),
                ));
            }
        }
        Ok(())
    }

    async fn propfind(&self, path: &str, depth: &str) -> StorageResult<Option<String>> {
        let url = format!("{}/", self.url_for(path).trim_end_matches('/'));
        let response = self
            .send(
                self.request(dav_method("PROPFIND")?, &url)
                    .header("Depth", depth)
                    .header("Content-Type", "application/xml")
                    .body(PROPFIND_BODY),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| StorageError::read(path, e))?;
                Ok(Some(body))
            }
            status => Err(StorageError::read(path, format!("PROPFIND returned {status}"))),
        }
    }
}

fn dav_method(name: &str) -> StorageResult<Method> {
    Method::from_bytes(name.as_bytes())
        .map_err(|e| StorageError::Config(format!("invalid method {name}: {e}")))
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Returns the text content of the first element with the given local name,
/// ignoring namespace prefixes. Self-closing elements yield `""`.
fn element_text<'a>(block: &'a str, local: &str) -> Option<&'a str> {
    let mut search = 0;
    while let Some(rel) = block[search..].find('<') {
        let open = search + rel;
        let rest = &block[open + 1..];
        let name_end = rest.find(['>', ' ', '/', '\t', '\n'])?;
        let name = &rest[..name_end];
        let local_name = name.rsplit(':').next().unwrap_or(name);
        if !name.is_empty() && local_name == local {
            let tag_end = open + 1 + rest.find('>')?;
            if block[..tag_end].ends_with('/') {
                return Some("");
            }
            let content_start = tag_end + 1;
            let close = block[content_start..].find("</")?;
            return Some(&block[content_start..content_start + close]);
        }
        search = open + 1;
    }
    None
}

#[derive(Debug, PartialEq)]
struct PropEntry {
    path: String,
    is_collection: bool,
    stat: Option<ObjectStat>,
}

/// Parses a multistatus body into entries with decoded, slash-trimmed paths.
fn parse_multistatus(body: &str) -> Vec<PropEntry> {
    body.split("response>")
        .filter_map(|block| {
            let href = element_text(block, "href")?.trim();
            let path = href_path(href);
            let is_collection = element_text(block, "collection").is_some();
            // Without a modification time an entry cannot be reconciled, so it
            // is left out of listings rather than given a made-up one.
            let stat = if is_collection {
                None
            } else if let Some(last_modified) =
                element_text(block, "getlastmodified").and_then(parse_http_date)
            {
                let size = element_text(block, "getcontentlength")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0);
                let content_hash = element_text(block, "getetag")
                    .map(|e| e.trim().trim_matches('"').replace("&quot;", ""))
                    .filter(|e| !e.is_empty());
                Some(ObjectStat {
                    size,
                    last_modified,
                    content_hash,
                })
            } else {
                warn!("skipping {path}: missing or invalid getlastmodified");
                None
            };
            Some(PropEntry {
                path,
                is_collection,
                stat,
            })
        })
        .collect()
}

fn href_path(href: &str) -> String {
    let path = match href.find("://") {
        Some(scheme_end) => {
            let after = &href[scheme_end + 3..];
            after.find('/').map_or("", |i| &after[i..])
        }
        None => href,
    };
    let decoded = urlencoding::decode(path)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| path.to_string());
    decoded.trim_matches('/').to_string()
}

#[async_trait]
impl Persistor for WebDavPersistor {
    fn name(&self) -> &'static str {
        "webdav"
    }

    async fn put(
        &self,
        location: &str,
        key: &str,
        data: Vec<u8>,
        _opts: PutOptions,
    ) -> StorageResult<()> {
        let path = self.object_path(location, key)?;
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.ensure_collections(parent).await?;
        }
        let size = data.len();
        let response = self
            .send(self.request(Method::PUT, &self.url_for(&path)).body(data))
            .await?;
        if !response.status().is_success() {
            return Err(StorageError::write(
                key,
                format!("PUT returned {}", response.status()),
            ));
        }
        debug!("uploaded {size} bytes to {}", self.url_for(&path));
        Ok(())
    }

    async fn get(&self, location: &str, key: &str, opts: GetOptions) -> StorageResult<Vec<u8>> {
        let path = self.object_path(location, key)?;
        let mut builder = self.request(Method::GET, &self.url_for(&path));
        if let Some(range) = opts.header_value() {
            builder = builder.header("Range", range);
        }
        let response = self.send(builder).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::not_found(location, key)),
            status if status.is_success() => Ok(response
                .bytes()
                .await
                .map_err(|e| StorageError::read(key, e))?
                .to_vec()),
            status => Err(StorageError::read(key, format!("GET returned {status}"))),
        }
    }

    async fn stat(&self, location: &str, key: &str) -> StorageResult<ObjectStat> {
        let path = self.object_path(location, key)?;
        let response = self
            .send(self.request(Method::HEAD, &self.url_for(&path)))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::not_found(location, key)),
            status if status.is_success() => {
                let size = header_str(&response, "content-length")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let last_modified = header_str(&response, "last-modified")
                    .and_then(parse_http_date)
                    .ok_or_else(|| StorageError::read(key, "missing Last-Modified header"))?;
                let content_hash =
                    header_str(&response, "etag").map(|e| e.trim_matches('"').to_string());
                Ok(ObjectStat {
                    size,
                    last_modified,
                    content_hash,
                })
            }
            status => Err(StorageError::read(key, format!("HEAD returned {status}"))),
        }
    }

    async fn delete(&self, location: &str, key: &str) -> StorageResult<()> {
        let path = self.object_path(location, key)?;
        let response = self
            .send(self.request(Method::DELETE, &self.url_for(&path)))
            .await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StorageError::write(key, format!("DELETE returned {status}")))
        }
    }

    async fn delete_directory(&self, location: &str, prefix: &str) -> StorageResult<()> {
        let path = join(&[&self.base_path, location, prefix]);
        let url = format!("{}/", self.url_for(&path).trim_end_matches('/'));
        let response = self.send(self.request(Method::DELETE, &url)).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!("deleted collection {url}");
            Ok(())
        } else {
            Err(StorageError::write(prefix, format!("DELETE returned {status}")))
        }
    }

    async fn copy(&self, location: &str, from: &str, to: &str) -> StorageResult<()> {
        let src = self.object_path(location, from)?;
        let dst = self.object_path(location, to)?;
        if let Some((parent, _)) = dst.rsplit_once('/') {
            self.ensure_collections(parent).await?;
        }
        let response = self
            .send(
                self.request(dav_method("COPY")?, &self.url_for(&src))
                    .header("Destination", self.url_for(&dst))
                    .header("Overwrite", "T"),
            )
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::not_found(location, from)),
            status if status.is_success() => Ok(()),
            status => Err(StorageError::write(to, format!("COPY returned {status}"))),
        }
    }

    async fn list_stats(
        &self,
        location: &str,
        prefix: &str,
    ) -> StorageResult<Vec<(String, ObjectStat)>> {
        let location_path = join(&[&self.base_path, location]);
        let start = join(&[&location_path, prefix]);
        let endpoint_path = href_path(&self.endpoint);
        let location_dir = format!("{location_path}/");
        let strip = |path: &str| -> String {
            let path = path
                .strip_prefix(endpoint_path.as_str())
                .unwrap_or(path)
                .trim_matches('/');
            if path == location_path {
                return String::new();
            }
            path.strip_prefix(location_dir.as_str())
                .unwrap_or(path)
                .to_string()
        };

        let mut out = Vec::new();
        let mut pending = VecDeque::from([start]);
        while let Some(dir) = pending.pop_front() {
            let Some(body) = self.propfind(&dir, "1").await? else {
                continue;
            };
            let own_path = join(&[&endpoint_path, &dir]);
            for entry in parse_multistatus(&body) {
                if entry.path == own_path {
                    continue;
                }
                let relative = strip(&entry.path);
                if entry.is_collection {
                    pending.push_back(join(&[&location_path, &relative]));
                } else if let Some(stat) = entry.stat {
                    out.push((relative, stat));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    async fn check_connection(&self) -> StorageResult<()> {
        match self.propfind(&self.base_path, "0").await? {
            Some(_) => Ok(()),
            None => self.ensure_collections(&self.base_path).await,
        }
    }
}
