//! Replication and backup configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};

/// Configuration for replication, snapshots and credential storage.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum concurrent entry transfers while building one snapshot.
    pub snapshot_concurrency: usize,

    /// Timeout applied to each outbound store or remote call (seconds).
    pub request_timeout_secs: u64,

    /// Branch committed to on version-control remotes.
    pub git_branch: String,

    pub git_author_name: String,
    pub git_author_email: String,

    /// Tag prefix marking snapshot commits on version-control remotes.
    pub backup_tag_prefix: String,

    /// Region used for S3 remotes.
    pub s3_region: String,

    /// Secret the credential vault key is derived from.
    pub credential_secret: Option<String>,

    /// Allows the built-in development secret when none is configured.
    pub allow_insecure_default_secret: bool,

    /// Parent directory for ephemeral git working trees. Defaults to the
    /// system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("snapshot_concurrency", &self.snapshot_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("git_branch", &self.git_branch)
            .field("git_author_name", &self.git_author_name)
            .field("git_author_email", &self.git_author_email)
            .field("backup_tag_prefix", &self.backup_tag_prefix)
            .field("s3_region", &self.s3_region)
            .field(
                "credential_secret",
                &self.credential_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("allow_insecure_default_secret", &self.allow_insecure_default_secret)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_concurrency: 5,
            request_timeout_secs: 30,
            git_branch: "main".to_string(),
            git_author_name: "docsync".to_string(),
            git_author_email: "backup@docsync.local".to_string(),
            backup_tag_prefix: "backup-".to_string(),
            s3_region: "us-east-1".to_string(),
            credential_secret: None,
            allow_insecure_default_secret: false,
            scratch_dir: None,
        }
    }
}

impl SyncConfig {
    /// Parses and validates a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::Config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.snapshot_concurrency == 0 {
            return Err(SyncError::Config(
                "snapshot_concurrency must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(SyncError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.git_branch.trim().is_empty() {
            return Err(SyncError::Config("git_branch must not be empty".to_string()));
        }
        if self.backup_tag_prefix.trim().is_empty() {
            return Err(SyncError::Config(
                "backup_tag_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Builds the credential vault described by this config.
    pub fn credential_vault(&self) -> SyncResult<docsync_crypto::CredentialVault> {
        Ok(docsync_crypto::CredentialVault::from_secret(
            self.credential_secret.as_deref(),
            self.allow_insecure_default_secret,
        )?)
    }
}
