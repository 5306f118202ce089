//! Modification-driven backup scheduling.
//!
//! [`BackupScheduler::on_modification`] counts at most one modification per
//! interval window. Events inside a window are not counted at all, so the
//! scheduler throttles how often it counts, not only how often it backs up.
//! Once the counted modifications reach the threshold, the counters reset
//! and a snapshot plus retention cleanup run in a detached task.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docsync_types::{BackupPolicy, UnitId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::engine::BackupEngine;
use crate::error::SyncResult;
use crate::unit_store::UnitStore;

/// Result of one modification event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    NotEnabled,
    /// Inside the current window; the event was not counted.
    NotCheckTime,
    ThresholdNotReached,
    /// Counters were reset and a backup was dispatched.
    Triggered,
    Error(String),
}

/// How concurrent events for the same unit are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CounterSerialization {
    /// One read-modify-write per unit at a time.
    #[default]
    PerUnit,
    /// No ordering. Concurrent events can observe the same counters and
    /// both trigger a backup.
    Unserialized,
}

/// Policy reads and counter writes used by the scheduler.
#[async_trait]
pub trait BackupPolicyStore: Send + Sync {
    async fn load_policy(&self, unit: &UnitId) -> SyncResult<BackupPolicy>;

    /// Persists both counters together.
    async fn save_counters(
        &self,
        unit: &UnitId,
        modification_count: u32,
        next_check_time: DateTime<Utc>,
    ) -> SyncResult<()>;
}

#[async_trait]
impl BackupPolicyStore for UnitStore {
    async fn load_policy(&self, unit: &UnitId) -> SyncResult<BackupPolicy> {
        UnitStore::load_policy(self, unit)
    }

    async fn save_counters(
        &self,
        unit: &UnitId,
        modification_count: u32,
        next_check_time: DateTime<Utc>,
    ) -> SyncResult<()> {
        UnitStore::save_counters(self, unit, modification_count, next_check_time)
    }
}

/// Work dispatched when the scheduler triggers.
#[async_trait]
pub trait BackupRunner: Send + Sync {
    async fn run_backup(&self, unit: &UnitId) -> SyncResult<()>;
}

#[async_trait]
impl BackupRunner for BackupEngine {
    /// Snapshot, then retention cleanup. A cleanup failure does not fail the
    /// backup.
    async fn run_backup(&self, unit: &UnitId) -> SyncResult<()> {
        self.create_snapshot(unit).await?;
        match self.cleanup_old_snapshots(unit).await {
            Ok(deleted) => debug!("cleanup after backup of unit {unit} deleted {deleted}"),
            Err(e) => warn!("cleanup after backup of unit {unit} failed: {e}"),
        }
        Ok(())
    }
}

pub struct BackupScheduler {
    store: Arc<dyn BackupPolicyStore>,
    runner: Arc<dyn BackupRunner>,
    clock: Arc<dyn Clock>,
    serialization: CounterSerialization,
    unit_locks: Mutex<HashMap<UnitId, Arc<tokio::sync::Mutex<()>>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl BackupScheduler {
    pub fn new(
        store: Arc<dyn BackupPolicyStore>,
        runner: Arc<dyn BackupRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_serialization(store, runner, clock, CounterSerialization::default())
    }

    pub fn with_serialization(
        store: Arc<dyn BackupPolicyStore>,
        runner: Arc<dyn BackupRunner>,
        clock: Arc<dyn Clock>,
        serialization: CounterSerialization,
    ) -> Self {
        Self {
            store,
            runner,
            clock,
            serialization,
            unit_locks: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    fn unit_lock(&self, unit: &UnitId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.unit_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(unit.clone()).or_default())
    }

    /// Records one modification of `unit`. Never fails; errors are logged
    /// and reported as [`ScheduleOutcome::Error`].
    pub async fn on_modification(&self, unit: &UnitId) -> ScheduleOutcome {
        let lock = match self.serialization {
            CounterSerialization::PerUnit => Some(self.unit_lock(unit)),
            CounterSerialization::Unserialized => None,
        };
        let guard = match &lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        let decision = self.advance(unit).await;
        drop(guard);

        match decision {
            Ok(ScheduleOutcome::Triggered) => {
                self.spawn_backup(unit);
                ScheduleOutcome::Triggered
            }
            Ok(outcome) => outcome,
            Err(e) => {
                error!("backup scheduling for unit {unit} failed: {e}");
                ScheduleOutcome::Error(e.to_string())
            }
        }
    }

    async fn advance(&self, unit: &UnitId) -> SyncResult<ScheduleOutcome> {
        let policy = self.store.load_policy(unit).await?;
        if !policy.enabled {
            return Ok(ScheduleOutcome::NotEnabled);
        }

        let now = self.clock.now();
        if let Some(next_check) = policy.next_check_time
            && now < next_check
        {
            debug!("unit {unit}: modification inside window ending {next_check}");
            return Ok(ScheduleOutcome::NotCheckTime);
        }

        let count = policy.modification_count + 1;
        let next_check_time = now + policy.interval();

        if count >= policy.modification_threshold {
            self.store.save_counters(unit, 0, next_check_time).await?;
            info!("unit {unit}: {count} modifications counted, triggering backup");
            Ok(ScheduleOutcome::Triggered)
        } else {
            self.store.save_counters(unit, count, next_check_time).await?;
            debug!(
                "unit {unit}: {count}/{} modifications counted",
                policy.modification_threshold
            );
            Ok(ScheduleOutcome::ThresholdNotReached)
        }
    }

    fn spawn_backup(&self, unit: &UnitId) {
        let runner = Arc::clone(&self.runner);
        let unit = unit.clone();
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = runner.run_backup(&unit).await {
                error!("scheduled backup of unit {unit} failed: {e}");
            }
        });
    }

    /// Waits for dispatched backups to finish.
    pub async fn wait_idle(&self) {
        loop {
            let mut tasks = {
                let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *guard)
            };
            if tasks.is_empty() {
                return;
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("backup task panicked: {e}");
                }
            }
        }
    }
}
