//! Persistent per-unit state: remote config, sync status and backup policy.
//!
//! Each unit carries exactly one row in each table. Snapshots are not stored
//! here; they live on the remote and are discovered by listing.

use chrono::{DateTime, Utc};
use docsync_types::{
    BackendKind, BackupPolicy, BackupPolicyUpdate, RemoteConfig, SyncStatus, UnitId,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{SyncError, SyncResult};

/// SQLite-backed store for unit state.
#[derive(Clone)]
pub struct UnitStore {
    conn: Arc<Mutex<Connection>>,
}

fn ts(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|t| t.to_rfc3339())
}

fn parse_ts(value: Option<String>) -> SyncResult<Option<DateTime<Utc>>> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SyncError::Database(format!("invalid timestamp {v}: {e}")))
        })
        .transpose()
}

fn read_policy(conn: &Connection, unit: &UnitId) -> SyncResult<BackupPolicy> {
    let row = conn
        .query_row(
            "SELECT enabled, modification_threshold, interval_minutes, max_backups,
                    modification_count, next_check_time, last_backup_at
             FROM unit_backup_policy WHERE unit_id = ?1",
            params![unit.as_str()],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            },
        )
        .optional()?;
    match row {
        Some((enabled, threshold, interval, max_backups, count, next_check, last_backup)) => {
            Ok(BackupPolicy {
                enabled,
                modification_threshold: threshold,
                interval_minutes: interval,
                max_backups,
                modification_count: count,
                next_check_time: parse_ts(next_check)?,
                last_backup_at: parse_ts(last_backup)?,
            })
        }
        None => Ok(BackupPolicy::default()),
    }
}

impl UnitStore {
    /// Opens (or creates) a store backed by a SQLite file.
    pub fn open(db_path: &Path) -> SyncResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    pub fn open_in_memory() -> SyncResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        };
        store.ensure_tables()?;
        Ok(store)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> SyncResult<T>) -> SyncResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SyncError::Database(e.to_string()))?;
        f(&conn)
    }

    fn ensure_tables(&self) -> SyncResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS unit_remote (
                    unit_id TEXT PRIMARY KEY,
                    backend_kind TEXT NOT NULL,
                    endpoint_url TEXT NOT NULL,
                    username TEXT NOT NULL,
                    encrypted_secret TEXT NOT NULL,
                    base_path TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    linked_at TEXT,
                    unlinked_at TEXT
                );
                CREATE TABLE IF NOT EXISTS unit_sync_status (
                    unit_id TEXT PRIMARY KEY,
                    is_syncing INTEGER NOT NULL DEFAULT 0,
                    last_sync_at TEXT,
                    last_sync_error TEXT
                );
                CREATE TABLE IF NOT EXISTS unit_backup_policy (
                    unit_id TEXT PRIMARY KEY,
                    enabled INTEGER NOT NULL,
                    modification_threshold INTEGER NOT NULL,
                    interval_minutes INTEGER NOT NULL,
                    max_backups INTEGER NOT NULL,
                    modification_count INTEGER NOT NULL DEFAULT 0,
                    next_check_time TEXT,
                    last_backup_at TEXT
                );",
            )?;
            Ok(())
        })
    }

    // ── Remote config ────────────────────────────────────────────

    pub fn load_remote(&self, unit: &UnitId) -> SyncResult<Option<RemoteConfig>> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT backend_kind, endpoint_url, username, encrypted_secret, base_path,
                            enabled, linked_at, unlinked_at
                     FROM unit_remote WHERE unit_id = ?1",
                    params![unit.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, bool>(5)?,
                            row.get::<_, Option<String>>(6)?,
                            row.get::<_, Option<String>>(7)?,
                        ))
                    },
                )
                .optional()?)
        })?;

        let Some((kind, endpoint_url, username, encrypted_secret, base_path, enabled, linked, unlinked)) =
            row
        else {
            return Ok(None);
        };
        let backend_kind = kind
            .parse::<BackendKind>()
            .map_err(SyncError::Database)?;
        Ok(Some(RemoteConfig {
            backend_kind,
            endpoint_url,
            username,
            encrypted_secret,
            base_path,
            enabled,
            linked_at: parse_ts(linked)?,
            unlinked_at: parse_ts(unlinked)?,
        }))
    }

    pub fn save_remote(&self, unit: &UnitId, remote: &RemoteConfig) -> SyncResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_remote (unit_id, backend_kind, endpoint_url, username,
                    encrypted_secret, base_path, enabled, linked_at, unlinked_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(unit_id) DO UPDATE SET
                    backend_kind = excluded.backend_kind,
                    endpoint_url = excluded.endpoint_url,
                    username = excluded.username,
                    encrypted_secret = excluded.encrypted_secret,
                    base_path = excluded.base_path,
                    enabled = excluded.enabled,
                    linked_at = excluded.linked_at,
                    unlinked_at = excluded.unlinked_at",
                params![
                    unit.as_str(),
                    remote.backend_kind.as_str(),
                    remote.endpoint_url,
                    remote.username,
                    remote.encrypted_secret,
                    remote.base_path,
                    remote.enabled,
                    ts(remote.linked_at),
                    ts(remote.unlinked_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Disables a unit's remote. Returns false if the unit was never linked.
    pub fn mark_unlinked(&self, unit: &UnitId, at: DateTime<Utc>) -> SyncResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE unit_remote SET enabled = 0, unlinked_at = ?2 WHERE unit_id = ?1",
                params![unit.as_str(), at.to_rfc3339()],
            )?;
            Ok(changed > 0)
        })
    }

    // ── Sync status ──────────────────────────────────────────────

    pub fn load_status(&self, unit: &UnitId) -> SyncResult<SyncStatus> {
        let row = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT is_syncing, last_sync_at, last_sync_error
                     FROM unit_sync_status WHERE unit_id = ?1",
                    params![unit.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, bool>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .optional()?)
        })?;
        match row {
            Some((is_syncing, last_sync_at, last_sync_error)) => Ok(SyncStatus {
                is_syncing,
                last_sync_at: parse_ts(last_sync_at)?,
                last_sync_error,
            }),
            None => Ok(SyncStatus::default()),
        }
    }

    pub fn mark_syncing(&self, unit: &UnitId) -> SyncResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_sync_status (unit_id, is_syncing) VALUES (?1, 1)
                 ON CONFLICT(unit_id) DO UPDATE SET is_syncing = 1",
                params![unit.as_str()],
            )?;
            Ok(())
        })
    }

    /// Records a finished attempt and clears any previous error.
    pub fn record_sync_success(&self, unit: &UnitId, at: DateTime<Utc>) -> SyncResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_sync_status (unit_id, is_syncing, last_sync_at, last_sync_error)
                 VALUES (?1, 0, ?2, NULL)
                 ON CONFLICT(unit_id) DO UPDATE SET
                    is_syncing = 0, last_sync_at = excluded.last_sync_at, last_sync_error = NULL",
                params![unit.as_str(), at.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Records a failed attempt. `last_sync_at` is left as it was.
    pub fn record_sync_error(&self, unit: &UnitId, message: &str) -> SyncResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_sync_status (unit_id, is_syncing, last_sync_error)
                 VALUES (?1, 0, ?2)
                 ON CONFLICT(unit_id) DO UPDATE SET
                    is_syncing = 0, last_sync_error = excluded.last_sync_error",
                params![unit.as_str(), message],
            )?;
            Ok(())
        })
    }

    // ── Backup policy ────────────────────────────────────────────

    /// Loads a unit's policy, falling back to the defaults.
    pub fn load_policy(&self, unit: &UnitId) -> SyncResult<BackupPolicy> {
        self.with_conn(|conn| read_policy(conn, unit))
    }

    pub fn save_policy(&self, unit: &UnitId, policy: &BackupPolicy) -> SyncResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_backup_policy (unit_id, enabled, modification_threshold,
                    interval_minutes, max_backups, modification_count, next_check_time, last_backup_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(unit_id) DO UPDATE SET
                    enabled = excluded.enabled,
                    modification_threshold = excluded.modification_threshold,
                    interval_minutes = excluded.interval_minutes,
                    max_backups = excluded.max_backups,
                    modification_count = excluded.modification_count,
                    next_check_time = excluded.next_check_time,
                    last_backup_at = excluded.last_backup_at",
                params![
                    unit.as_str(),
                    policy.enabled,
                    policy.modification_threshold,
                    policy.interval_minutes,
                    policy.max_backups,
                    policy.modification_count,
                    ts(policy.next_check_time),
                    ts(policy.last_backup_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Writes the scheduler counters in one statement.
    pub fn save_counters(
        &self,
        unit: &UnitId,
        modification_count: u32,
        next_check_time: DateTime<Utc>,
    ) -> SyncResult<()> {
        let defaults = BackupPolicy::default();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_backup_policy (unit_id, enabled, modification_threshold,
                    interval_minutes, max_backups, modification_count, next_check_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(unit_id) DO UPDATE SET
                    modification_count = excluded.modification_count,
                    next_check_time = excluded.next_check_time",
                params![
                    unit.as_str(),
                    defaults.enabled,
                    defaults.modification_threshold,
                    defaults.interval_minutes,
                    defaults.max_backups,
                    modification_count,
                    next_check_time.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Applies a partial settings update under one lock. Counters and
    /// `last_backup_at` are never written here.
    pub fn update_policy(
        &self,
        unit: &UnitId,
        update: &BackupPolicyUpdate,
    ) -> SyncResult<BackupPolicy> {
        self.with_conn(|conn| {
            let mut policy = read_policy(conn, unit)?;
            policy
                .apply(update)
                .map_err(|field| SyncError::Validation(format!("{field} must be at least 1")))?;
            conn.execute(
                "INSERT INTO unit_backup_policy (unit_id, enabled, modification_threshold,
                    interval_minutes, max_backups)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(unit_id) DO UPDATE SET
                    enabled = excluded.enabled,
                    modification_threshold = excluded.modification_threshold,
                    interval_minutes = excluded.interval_minutes,
                    max_backups = excluded.max_backups",
                params![
                    unit.as_str(),
                    policy.enabled,
                    policy.modification_threshold,
                    policy.interval_minutes,
                    policy.max_backups,
                ],
            )?;
            Ok(policy)
        })
    }

    /// Sets `last_backup_at` only; the scheduler counters are untouched.
    pub fn record_backup(&self, unit: &UnitId, at: DateTime<Utc>) -> SyncResult<()> {
        let defaults = BackupPolicy::default();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO unit_backup_policy (unit_id, enabled, modification_threshold,
                    interval_minutes, max_backups, last_backup_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(unit_id) DO UPDATE SET last_backup_at = excluded.last_backup_at",
                params![
                    unit.as_str(),
                    defaults.enabled,
                    defaults.modification_threshold,
                    defaults.interval_minutes,
                    defaults.max_backups,
                    at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }
}
