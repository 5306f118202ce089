mod support;

use chrono::Duration;
use docsync_storage::{MemoryPersistor, Persistor};
use docsync_sync::{
    BackupEngine, ContentSource, ManualClock, PersistorCache, RemoteBackend, SnapshotOutcome,
    SyncError, UnitStore, collect_entries, unit_backups_location,
};
use docsync_types::{BackendKind, BackupPolicy, Folder, UnitId, snapshot_id_for};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use support::{
    MemoryTree, StaticConfigProvider, StaticConnector, StuckDeletePersistor, at, init_tracing,
    target,
};

const REMOTE: &str = "mem://remote";

fn unit() -> UnitId {
    UnitId::new("unit-1")
}

fn backups(unit: &UnitId) -> String {
    unit_backups_location(unit).unwrap()
}

fn sample_tree() -> MemoryTree {
    let root = Folder::named("root")
        .with_doc("d1", "readme.md")
        .with_file("f2", "raw.bin", None)
        .with_folder(
            Folder::named("notes")
                .with_doc("d2", "a.md")
                .with_file("f1", "img.png", Some("abc123")),
        );
    MemoryTree::new(root)
        .doc("d1", "# Readme")
        .doc("d2", "note a")
        .file("f1", b"\x89PNG")
        .file("f2", b"unhashed")
}

struct Fixture {
    remote: Arc<MemoryPersistor>,
    store: UnitStore,
    clock: Arc<ManualClock>,
    tree: Arc<MemoryTree>,
    engine: BackupEngine,
}

/// Engine whose units in `units` all share one filesystem-like remote.
fn engine_over(
    remote: Arc<dyn Persistor>,
    units: &[UnitId],
    store: &UnitStore,
    clock: Arc<ManualClock>,
    tree: Arc<MemoryTree>,
) -> BackupEngine {
    init_tracing();
    let provider = Arc::new(StaticConfigProvider::default());
    for unit in units {
        provider.set(unit, target(BackendKind::Filesystem, REMOTE));
    }
    let connector = Arc::new(StaticConnector::default());
    connector.register(REMOTE, RemoteBackend::FilesystemLike(remote));
    BackupEngine::new(
        store.clone(),
        Arc::new(PersistorCache::new(provider, connector)),
        tree,
        clock,
        2,
    )
}

fn fixture(tree: MemoryTree) -> Fixture {
    let remote = Arc::new(MemoryPersistor::new());
    let store = UnitStore::open_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(at(14, 30, 0)));
    let tree = Arc::new(tree);
    let engine = engine_over(
        remote.clone(),
        &[unit()],
        &store,
        clock.clone(),
        tree.clone(),
    );
    Fixture {
        remote,
        store,
        clock,
        tree,
        engine,
    }
}

#[test]
fn entries_cover_docs_and_hashed_files() {
    let root = Folder::named("root")
        .with_doc("d1", "readme.md")
        .with_file("f0", "skip.bin", None)
        .with_folder(
            Folder::named("a").with_folder(Folder::named("b").with_file("f1", "x.png", Some("h"))),
        );

    assert_eq!(
        collect_entries(&root),
        vec![
            (
                "readme.md".to_string(),
                ContentSource::Document {
                    id: "d1".to_string()
                }
            ),
            (
                "a/b/x.png".to_string(),
                ContentSource::File {
                    id: "f1".to_string(),
                    hash: "h".to_string()
                }
            ),
        ]
    );
}

// ── create_snapshot ──────────────────────────────────────────────

#[tokio::test]
async fn snapshot_copies_tree_into_timestamped_directory() {
    let f = fixture(sample_tree());
    let id = snapshot_id_for(at(14, 30, 0));

    let outcome = f.engine.create_snapshot(&unit()).await.unwrap();

    let SnapshotOutcome::Created {
        snapshot,
        transferred,
        failed,
    } = outcome
    else {
        panic!("expected a snapshot, got {outcome:?}");
    };
    assert_eq!(snapshot.id, id);
    assert_eq!(snapshot.location, format!("backups/unit-1/{id}"));
    assert_eq!((transferred, failed), (3, 0));

    let content = |path: &str| {
        let remote = f.remote.clone();
        let key = format!("{id}/{path}");
        async move { remote.content(&backups(&unit()), &key).await }
    };
    assert_eq!(content("readme.md").await.unwrap(), b"# Readme");
    assert_eq!(content("notes/a.md").await.unwrap(), b"note a");
    assert_eq!(content("notes/img.png").await.unwrap(), b"\x89PNG");
    assert!(content("raw.bin").await.is_none());
}

#[tokio::test]
async fn snapshot_updates_status_and_policy() {
    let f = fixture(sample_tree());
    f.store
        .record_sync_error(&unit(), "earlier failure")
        .unwrap();

    f.engine.create_snapshot(&unit()).await.unwrap();

    let status = f.store.load_status(&unit()).unwrap();
    assert!(!status.is_syncing);
    assert_eq!(status.last_sync_at, Some(at(14, 30, 0)));
    assert_eq!(status.last_sync_error, None);
    let policy = f.store.load_policy(&unit()).unwrap();
    assert_eq!(policy.last_backup_at, Some(at(14, 30, 0)));
}

#[tokio::test]
async fn unreadable_entries_are_skipped_and_counted() {
    let f = fixture(sample_tree());
    f.tree.break_entry("d2");

    let outcome = f.engine.create_snapshot(&unit()).await.unwrap();

    assert!(matches!(
        outcome,
        SnapshotOutcome::Created {
            transferred: 2,
            failed: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn tree_failure_is_recorded_and_returned() {
    let f = fixture(sample_tree());
    f.tree.fail_tree();

    let err = f.engine.create_snapshot(&unit()).await.unwrap_err();

    assert!(matches!(err, SyncError::Content(_)));
    let status = f.store.load_status(&unit()).unwrap();
    assert!(!status.is_syncing);
    assert!(status.last_sync_error.unwrap().contains("tree service unavailable"));
    assert!(f.remote.is_empty().await);
    assert_eq!(f.store.load_policy(&unit()).unwrap().last_backup_at, None);
}

#[tokio::test]
async fn snapshot_requires_a_linked_remote() {
    let f = fixture(sample_tree());
    let other = UnitId::new("unlinked");

    let err = f.engine.create_snapshot(&other).await.unwrap_err();

    assert!(matches!(err, SyncError::NotLinked(_)));
    assert!(!f.store.load_status(&other).unwrap().is_syncing);
}

#[tokio::test]
async fn unreachable_remote_is_recorded_as_sync_error() {
    let f = fixture(sample_tree());
    let store = UnitStore::open_in_memory().unwrap();
    let provider = Arc::new(StaticConfigProvider::default());
    provider.set(&unit(), target(BackendKind::WebDav, "https://dav.offline.example"));
    let engine = BackupEngine::new(
        store.clone(),
        Arc::new(PersistorCache::new(provider, Arc::new(StaticConnector::default()))),
        f.tree.clone(),
        f.clock.clone(),
        2,
    );

    let err = engine.create_snapshot(&unit()).await.unwrap_err();

    assert!(matches!(err, SyncError::Connection(_)));
    let status = store.load_status(&unit()).unwrap();
    assert!(!status.is_syncing);
    assert!(status.last_sync_error.is_some());
}

// ── Listing and retention ────────────────────────────────────────

async fn seed_snapshots(f: &Fixture, count: u32) -> Vec<String> {
    let mut ids = Vec::new();
    for i in 0..count {
        let id = snapshot_id_for(at(1, i, 0));
        f.remote
            .insert_at(&backups(&unit()), &format!("{id}/readme.md"), "x", at(1, i, 0))
            .await;
        ids.push(id);
    }
    ids
}

#[tokio::test]
async fn list_backups_is_newest_first() {
    let f = fixture(sample_tree());
    let ids = seed_snapshots(&f, 3).await;
    f.remote
        .insert_at(&backups(&unit()), "not-a-snapshot/file", "x", at(1, 0, 0))
        .await;

    let listed: Vec<String> = f
        .engine
        .list_backups(&unit())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();

    assert_eq!(listed, vec![ids[2].clone(), ids[1].clone(), ids[0].clone()]);
}

#[tokio::test]
async fn cleanup_deletes_only_snapshots_beyond_the_cap() {
    let f = fixture(sample_tree());
    let ids = seed_snapshots(&f, 12).await;
    f.store
        .save_policy(
            &unit(),
            &BackupPolicy {
                max_backups: 10,
                ..BackupPolicy::default()
            },
        )
        .unwrap();

    let deleted = f.engine.cleanup_old_snapshots(&unit()).await.unwrap();

    assert_eq!(deleted, 2);
    let remaining: Vec<String> = f
        .engine
        .list_backups(&unit())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    let expected: Vec<String> = ids[2..].iter().rev().cloned().collect();
    assert_eq!(remaining, expected);
    assert!(
        f.remote
            .content(&backups(&unit()), &format!("{}/readme.md", ids[0]))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn cleanup_under_the_cap_is_a_no_op() {
    let f = fixture(sample_tree());
    seed_snapshots(&f, 4).await;
    assert_eq!(f.engine.cleanup_old_snapshots(&unit()).await.unwrap(), 0);
    assert_eq!(f.engine.list_backups(&unit()).await.unwrap().len(), 4);
}

#[tokio::test]
async fn successive_snapshots_get_distinct_ids() {
    let f = fixture(sample_tree());
    f.engine.create_snapshot(&unit()).await.unwrap();
    f.clock.advance(Duration::milliseconds(1));
    f.engine.create_snapshot(&unit()).await.unwrap();

    assert_eq!(f.engine.list_backups(&unit()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn failed_deletion_does_not_stop_retention() {
    let remote = Arc::new(StuckDeletePersistor::default());
    let store = UnitStore::open_in_memory().unwrap();
    let engine = engine_over(
        remote.clone(),
        &[unit()],
        &store,
        Arc::new(ManualClock::new(at(14, 30, 0))),
        Arc::new(sample_tree()),
    );
    let mut ids = Vec::new();
    for i in 0..5 {
        let id = snapshot_id_for(at(1, i, 0));
        remote
            .inner
            .insert_at(&backups(&unit()), &format!("{id}/readme.md"), "x", at(1, i, 0))
            .await;
        ids.push(id);
    }
    remote.stick(&ids[1]);
    store
        .save_policy(
            &unit(),
            &BackupPolicy {
                max_backups: 2,
                ..BackupPolicy::default()
            },
        )
        .unwrap();

    let deleted = engine.cleanup_old_snapshots(&unit()).await.unwrap();

    assert_eq!(deleted, 2);
    let remaining: Vec<String> = engine
        .list_backups(&unit())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(remaining, vec![ids[4].clone(), ids[3].clone(), ids[1].clone()]);
}

// ── Units sharing a remote ───────────────────────────────────────

#[tokio::test]
async fn units_on_one_remote_keep_separate_snapshots() {
    let remote = Arc::new(MemoryPersistor::new());
    let store = UnitStore::open_in_memory().unwrap();
    let clock = Arc::new(ManualClock::new(at(10, 0, 0)));
    let (a, b) = (UnitId::new("unit-a"), UnitId::new("unit-b"));
    let engine = engine_over(
        remote.clone(),
        &[a.clone(), b.clone()],
        &store,
        clock.clone(),
        Arc::new(sample_tree()),
    );

    engine.create_snapshot(&b).await.unwrap();
    clock.set(at(11, 0, 0));
    engine.create_snapshot(&a).await.unwrap();
    clock.set(at(12, 0, 0));
    engine.create_snapshot(&a).await.unwrap();
    store
        .save_policy(
            &a,
            &BackupPolicy {
                max_backups: 1,
                ..BackupPolicy::default()
            },
        )
        .unwrap();

    let ids = |snapshots: Vec<docsync_types::Snapshot>| -> Vec<String> {
        snapshots.into_iter().map(|s| s.id).collect()
    };
    assert_eq!(
        ids(engine.list_backups(&a).await.unwrap()),
        vec![snapshot_id_for(at(12, 0, 0)), snapshot_id_for(at(11, 0, 0))]
    );

    assert_eq!(engine.cleanup_old_snapshots(&a).await.unwrap(), 1);

    assert_eq!(
        ids(engine.list_backups(&a).await.unwrap()),
        vec![snapshot_id_for(at(12, 0, 0))]
    );
    assert_eq!(
        ids(engine.list_backups(&b).await.unwrap()),
        vec![snapshot_id_for(at(10, 0, 0))]
    );
}
