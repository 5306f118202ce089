use chrono::{TimeZone, Utc};
use docsync_types::*;
use pretty_assertions::assert_eq;

// ── Snapshot ids ──

#[test]
fn snapshot_id_is_filesystem_safe() {
    let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 5).unwrap();
    let id = snapshot_id_for(at);
    assert_eq!(id, "2026-10-17T09-30-05-000Z");
    assert!(!id.contains(':'));
}

#[test]
fn snapshot_ids_sort_chronologically() {
    let earlier = Utc.with_ymd_and_hms(2026, 1, 2, 23, 59, 59).unwrap();
    let later = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
    assert!(snapshot_id_for(earlier) < snapshot_id_for(later));
}

#[test]
fn snapshot_id_parses_back() {
    let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
    let id = snapshot_id_for(at);
    let snapshot = Snapshot::from_id(&id, "backups/x").unwrap();
    assert_eq!(snapshot.created_at, at);
    assert_eq!(snapshot.location, "backups/x");
}

#[test]
fn foreign_names_are_not_snapshots() {
    assert!(Snapshot::from_id("notes.txt", "x").is_none());
    assert!(Snapshot::from_id("v1.0", "x").is_none());
}

// ── Backend kinds ──

#[test]
fn backend_classes() {
    assert_eq!(BackendKind::WebDav.class(), BackendClass::FilesystemLike);
    assert_eq!(BackendKind::Filesystem.class(), BackendClass::FilesystemLike);
    assert_eq!(BackendKind::S3.class(), BackendClass::ObjectStoreLike);
    assert_eq!(BackendKind::Git.class(), BackendClass::VersionControlLike);
}

#[test]
fn backend_kind_parses_case_insensitively() {
    assert_eq!("WebDAV".parse::<BackendKind>().unwrap(), BackendKind::WebDav);
    assert_eq!("git".parse::<BackendKind>().unwrap(), BackendKind::Git);
    assert!("ftp".parse::<BackendKind>().is_err());
}

#[test]
fn backend_kind_serializes_lowercase() {
    let json = serde_json::to_string(&BackendKind::WebDav).unwrap();
    assert_eq!(json, "\"webdav\"");
}

#[test]
fn remote_target_debug_redacts_secret() {
    let target = RemoteTarget {
        backend_kind: BackendKind::WebDav,
        endpoint_url: "https://dav.example.com".into(),
        username: "alice".into(),
        secret: "hunter2".into(),
        base_path: "/projects/".into(),
        enabled: true,
    };
    let debug = format!("{target:?}");
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("[REDACTED]"));
    assert_eq!(target.normalized_base_path(), "projects");
}

// ── Backup policy ──

#[test]
fn default_policy_is_disabled() {
    let policy = BackupPolicy::default();
    assert!(!policy.enabled);
    assert_eq!(policy.modification_count, 0);
    assert!(policy.next_check_time.is_none());
}

#[test]
fn policy_update_applies_only_given_fields() {
    let mut policy = BackupPolicy::default();
    policy
        .apply(&BackupPolicyUpdate {
            enabled: Some(true),
            max_backups: Some(3),
            ..Default::default()
        })
        .unwrap();
    assert!(policy.enabled);
    assert_eq!(policy.max_backups, 3);
    assert_eq!(policy.interval_minutes, BackupPolicy::default().interval_minutes);
}

#[test]
fn policy_update_rejects_zero_bounds() {
    let mut policy = BackupPolicy::default();
    let err = policy
        .apply(&BackupPolicyUpdate {
            enabled: Some(true),
            interval_minutes: Some(0),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err, "interval_minutes");
    // Rejected updates leave the policy untouched.
    assert!(!policy.enabled);
}

// ── Content tree ──

#[test]
fn folder_builder_nests() {
    let tree = Folder::named("")
        .with_doc("d1", "main.tex")
        .with_folder(Folder::named("img").with_file("f1", "a.png", Some("abc")));
    assert_eq!(tree.docs.len(), 1);
    assert_eq!(tree.folders[0].files[0].hash.as_deref(), Some("abc"));
}
