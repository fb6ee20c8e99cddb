// ABOUTME: Integration tests for the per-node run lock.
// ABOUTME: Covers contention, stale and corrupted lock files, and release on drop.

mod support;

use chrono::{Duration, Utc};
use pg_upgrader::diagnostics::WarningKind;
use pg_upgrader::upgrade::{LockError, LockInfo, UpgradeLock};
use std::fs;
use support::diagnostics;

fn write_lock(state_dir: &std::path::Path, info: &LockInfo) {
    fs::create_dir_all(state_dir).unwrap();
    fs::write(
        LockInfo::lock_path(state_dir),
        serde_json::to_string(info).unwrap(),
    )
    .unwrap();
}

#[test]
fn acquire_creates_state_dir_and_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let state_dir = dir.path().join("state");
    let mut diag = diagnostics();

    let _lock = UpgradeLock::acquire(&state_dir, "pg-upgrade", &mut diag).unwrap();

    let json = fs::read_to_string(LockInfo::lock_path(&state_dir)).unwrap();
    let info: LockInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(info.operation, "pg-upgrade");
    assert_eq!(info.pid, std::process::id());
    assert!(!diag.has_warnings());
}

#[test]
fn lock_is_released_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let mut diag = diagnostics();

    {
        let _lock = UpgradeLock::acquire(dir.path(), "pg-upgrade", &mut diag).unwrap();
        assert!(LockInfo::lock_path(dir.path()).exists());
    }

    assert!(!LockInfo::lock_path(dir.path()).exists());
    let _again = UpgradeLock::acquire(dir.path(), "revert-pg-upgrade", &mut diag).unwrap();
}

#[test]
fn second_acquire_is_refused_while_held() {
    let dir = tempfile::tempdir().unwrap();
    let mut diag = diagnostics();

    let _held = UpgradeLock::acquire(dir.path(), "pg-upgrade", &mut diag).unwrap();
    let err = UpgradeLock::acquire(dir.path(), "revert-pg-upgrade", &mut diag).unwrap_err();

    match err {
        LockError::Held { operation, pid, .. } => {
            assert_eq!(operation, "pg-upgrade");
            assert_eq!(pid, std::process::id());
        }
        other => panic!("expected held lock, got {other}"),
    }
}

#[test]
fn stale_lock_is_broken_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut stale = LockInfo::new("pg-upgrade");
    stale.pid = 1;
    stale.started_at = Utc::now() - Duration::hours(48);
    write_lock(dir.path(), &stale);
    let mut diag = diagnostics();

    let _lock = UpgradeLock::acquire(dir.path(), "revert-pg-upgrade", &mut diag).unwrap();

    assert!(diag.contains(WarningKind::StaleLock));
    let json = fs::read_to_string(LockInfo::lock_path(dir.path())).unwrap();
    let info: LockInfo = serde_json::from_str(&json).unwrap();
    assert_eq!(info.operation, "revert-pg-upgrade");
}

#[test]
fn corrupted_lock_is_broken_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(LockInfo::lock_path(dir.path()), "{ not json").unwrap();
    let mut diag = diagnostics();

    let _lock = UpgradeLock::acquire(dir.path(), "pg-upgrade", &mut diag).unwrap();

    assert!(diag.contains(WarningKind::StaleLock));
    assert!(diag.warnings()[0].message.contains("unreadable"));
}
