//! Backup scheduling policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODIFICATION_THRESHOLD: u32 = 5;
pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;
pub const DEFAULT_MAX_BACKUPS: u32 = 10;

/// Per-unit backup policy and counter state.
///
/// `modification_count` stays below `modification_threshold` except between
/// reaching the threshold and the reset being written. `next_check_time`
/// never moves backwards once set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub modification_threshold: u32,
    pub interval_minutes: u32,
    pub max_backups: u32,
    pub modification_count: u32,
    pub next_check_time: Option<DateTime<Utc>>,
    pub last_backup_at: Option<DateTime<Utc>>,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            modification_threshold: DEFAULT_MODIFICATION_THRESHOLD,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            max_backups: DEFAULT_MAX_BACKUPS,
            modification_count: 0,
            next_check_time: None,
            last_backup_at: None,
        }
    }
}

impl BackupPolicy {
    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.interval_minutes))
    }

    /// Applies a partial update. Returns the name of the first field that
    /// violates its lower bound.
    pub fn apply(&mut self, update: &BackupPolicyUpdate) -> Result<(), &'static str> {
        if update.modification_threshold == Some(0) {
            return Err("modification_threshold");
        }
        if update.interval_minutes == Some(0) {
            return Err("interval_minutes");
        }
        if update.max_backups == Some(0) {
            return Err("max_backups");
        }

        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(threshold) = update.modification_threshold {
            self.modification_threshold = threshold;
        }
        if let Some(minutes) = update.interval_minutes {
            self.interval_minutes = minutes;
        }
        if let Some(max) = update.max_backups {
            self.max_backups = max;
        }
        Ok(())
    }
}

/// Fields a caller may change on a policy. Counters are not settable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupPolicyUpdate {
    pub enabled: Option<bool>,
    pub modification_threshold: Option<u32>,
    pub interval_minutes: Option<u32>,
    pub max_backups: Option<u32>,
}
