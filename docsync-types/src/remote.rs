//! Remote (secondary store) configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Protocol spoken by a remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    WebDav,
    Filesystem,
    S3,
    Git,
}

/// How a backend stores snapshots and whether it can mirror objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendClass {
    FilesystemLike,
    ObjectStoreLike,
    VersionControlLike,
}

impl BackendKind {
    pub fn class(self) -> BackendClass {
        match self {
            BackendKind::WebDav | BackendKind::Filesystem => BackendClass::FilesystemLike,
            BackendKind::S3 => BackendClass::ObjectStoreLike,
            BackendKind::Git => BackendClass::VersionControlLike,
        }
    }

    /// Whether linking requires a username and secret.
    pub fn requires_credentials(self) -> bool {
        !matches!(self, BackendKind::Filesystem)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::WebDav => "webdav",
            BackendKind::Filesystem => "filesystem",
            BackendKind::S3 => "s3",
            BackendKind::Git => "git",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webdav" => Ok(BackendKind::WebDav),
            "filesystem" | "fs" => Ok(BackendKind::Filesystem),
            "s3" => Ok(BackendKind::S3),
            "git" => Ok(BackendKind::Git),
            other => Err(format!("unknown backend kind: {other}")),
        }
    }
}

/// Persisted remote configuration of a unit.
///
/// Created on link and only mutated by link/unlink. Unlink keeps the
/// encrypted secret until a later link overwrites it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub backend_kind: BackendKind,
    pub endpoint_url: String,
    pub username: String,
    /// `ivHex:cipherHex` produced by the credential vault.
    pub encrypted_secret: String,
    pub base_path: String,
    pub enabled: bool,
    pub linked_at: Option<DateTime<Utc>>,
    pub unlinked_at: Option<DateTime<Utc>>,
}

/// Decrypted remote configuration handed to connectors.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub backend_kind: BackendKind,
    pub endpoint_url: String,
    pub username: String,
    pub secret: String,
    pub base_path: String,
    pub enabled: bool,
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("backend_kind", &self.backend_kind)
            .field("endpoint_url", &self.endpoint_url)
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .field("base_path", &self.base_path)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl RemoteTarget {
    /// Base path without leading or trailing slashes ("" for the root).
    pub fn normalized_base_path(&self) -> String {
        self.base_path.trim_matches('/').to_string()
    }
}
