//! Replication and scheduled snapshots for docsync.
//!
//! A unit's objects live in a primary store and are mirrored, best-effort,
//! to an optional secondary store chosen per unit:
//!
//! - [`SyncPersistor`]: writes to the primary, replicates in the background,
//!   reconciles by last-modified time before reads
//! - [`BackupScheduler`]: counts modifications in interval windows and
//!   triggers snapshots
//! - [`BackupEngine`]: builds snapshots on the remote and enforces retention
//! - [`RemoteService`]: link/unlink, status and policy surface
//!
//! Background work never fails its caller; it logs and records
//! `last_sync_error` on the unit instead.

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod git;
pub mod provider;
pub mod remote;
pub mod scheduler;
pub mod service;
pub mod snapshot;
pub mod sync_persistor;
pub mod unit_store;

pub use cache::PersistorCache;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use engine::{BackupEngine, ContentSource, SnapshotOutcome, collect_entries};
pub use error::{SyncError, SyncResult};
pub use git::GitRemote;
pub use provider::{ConfigProvider, StoredConfigProvider, TreeProvider};
pub use remote::{DefaultConnector, RemoteBackend, RemoteConnector};
pub use scheduler::{
    BackupPolicyStore, BackupRunner, BackupScheduler, CounterSerialization, ScheduleOutcome,
};
pub use service::{LinkRequest, RemoteService, RemoteServiceBuilder};
pub use snapshot::{
    BACKUPS_LOCATION, DirectorySnapshots, GitSnapshots, SnapshotBackend, SnapshotContainer,
    unit_backups_location, validate_unit_id,
};
pub use sync_persistor::{
    LoggingSink, Reconciliation, ReplicationSink, StatusSink, SyncPersistor, SyncReport,
};
pub use unit_store::UnitStore;
