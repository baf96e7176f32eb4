//! Tests for the locks subsystem.

use super::*;
use crate::error::OpgateError;
use chrono::NaiveDateTime;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use tempfile::TempDir;

fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

fn lock_in(dir: &TempDir) -> ProcessLock {
    ProcessLock::new(dir.path().join("__lock_file__"))
}

// ============================================================================
// ProcessLock
// ============================================================================

#[test]
fn test_second_handle_is_contended_until_release() {
    let dir = TempDir::new().unwrap();
    let mut first = lock_in(&dir);
    let mut second = lock_in(&dir);

    assert!(first.try_acquire().unwrap());
    assert!(!second.try_acquire().unwrap());
    assert!(!second.is_held());

    first.release().unwrap();
    assert!(second.try_acquire().unwrap());
}

#[test]
fn test_concurrent_try_acquire_has_single_winner() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("__lock_file__");
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let winners = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let path = path.clone();
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut lock = ProcessLock::new(path);
                barrier.wait();
                if lock.try_acquire().unwrap() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
                // Hold until everyone has tried.
                done.wait();
                lock.release().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[test]
fn test_release_without_acquire_is_noop() {
    let dir = TempDir::new().unwrap();
    let mut idle = lock_in(&dir);
    let mut other = lock_in(&dir);

    idle.release().unwrap();
    idle.release().unwrap();

    assert!(other.try_acquire().unwrap());
    // A stray release on another handle must not free the holder's lock.
    idle.release().unwrap();
    assert!(!idle.try_acquire().unwrap());
}

#[test]
fn test_try_acquire_twice_on_same_handle() {
    let dir = TempDir::new().unwrap();
    let mut lock = lock_in(&dir);

    assert!(lock.try_acquire().unwrap());
    assert!(lock.try_acquire().unwrap());
    assert!(lock.is_held());
}

#[test]
fn test_missing_directory_is_path_unavailable() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope");
    let mut lock = ProcessLock::new(missing.join("__lock_file__"));

    match lock.try_acquire() {
        Err(OpgateError::PathUnavailable { path }) => assert_eq!(path, missing),
        other => panic!("expected PathUnavailable, got {other:?}"),
    }
    assert!(!missing.exists());
}

#[test]
fn test_lock_file_persists_after_release() {
    let dir = TempDir::new().unwrap();
    let mut lock = lock_in(&dir);

    lock.try_acquire().unwrap();
    lock.release().unwrap();

    assert!(lock.path().exists());
}

#[test]
fn test_is_locked_probe_does_not_hold() {
    let dir = TempDir::new().unwrap();
    let mut probe = lock_in(&dir);
    let mut holder = lock_in(&dir);

    assert!(!is_locked(&mut probe).unwrap());
    assert!(!probe.is_held());

    holder.try_acquire().unwrap();
    assert!(is_locked(&mut probe).unwrap());
    assert!(!probe.is_held());
}

// ============================================================================
// LockGuard
// ============================================================================

#[test]
fn test_guard_releases_on_drop() {
    let dir = TempDir::new().unwrap();
    let mut lock = lock_in(&dir);
    let mut other = lock_in(&dir);

    assert!(lock.try_acquire().unwrap());
    {
        let _guard = LockGuard::new(&mut lock);
        assert!(!other.try_acquire().unwrap());
    }
    assert!(other.try_acquire().unwrap());
}

#[test]
fn test_guard_releases_when_work_fails() {
    let dir = TempDir::new().unwrap();
    let mut lock = lock_in(&dir);
    let mut other = lock_in(&dir);

    let result: crate::error::Result<()> = (|| {
        assert!(lock.try_acquire()?);
        let _guard = LockGuard::new(&mut lock);
        Err(OpgateError::UserError("boom".to_string()))
    })();

    assert!(result.is_err());
    assert!(other.try_acquire().unwrap());
}

#[test]
fn test_guard_releases_on_panic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("__lock_file__");
    let panic_path = path.clone();

    let outcome = std::panic::catch_unwind(move || {
        let mut lock = ProcessLock::new(panic_path);
        assert!(lock.try_acquire().unwrap());
        let _guard = LockGuard::new(&mut lock);
        panic!("protected work panicked");
    });

    assert!(outcome.is_err());
    let mut other = ProcessLock::new(path);
    assert!(other.try_acquire().unwrap());
}

#[test]
fn test_guard_manual_release() {
    let dir = TempDir::new().unwrap();
    let mut lock = lock_in(&dir);

    lock.try_acquire().unwrap();
    let guard = LockGuard::new(&mut lock);
    guard.release().unwrap();

    assert!(!lock.is_held());
}

// ============================================================================
// HolderRecord / HolderRegistry
// ============================================================================

#[test]
fn test_parse_record_in_either_order() {
    let a = HolderRecord::parse("Timestamp: 2024-01-01 10:00:00\nUsername: alice\n");
    let b = HolderRecord::parse("Username: alice\nTimestamp: 2024-01-01 10:00:00\n");

    assert_eq!(a, b);
    assert_eq!(a.owner, "alice");
    assert_eq!(a.acquired_at, Some(ts("2024-01-01 10:00:00")));
}

#[test]
fn test_parse_empty_and_truncated_records() {
    assert!(HolderRecord::parse("").is_unknown());
    assert!(HolderRecord::parse("Timest").is_unknown());

    let partial = HolderRecord::parse("Timestamp: 2024-01-01 10:00:00\nUsern");
    assert_eq!(partial.owner, "unknown");
    assert!(partial.acquired_at.is_some());
}

#[test]
fn test_parse_ignores_unknown_keys_and_bad_values() {
    let record = HolderRecord::parse(
        "Username: bob\nTimestamp: yesterday-ish\nPid: not-a-pid\nShift: night\n",
    );

    assert_eq!(record.owner, "bob");
    assert_eq!(record.acquired_at, None);
    assert_eq!(record.pid, None);
}

#[test]
fn test_render_then_parse_keeps_host_and_pid() {
    let record = HolderRecord {
        owner: "carol".to_string(),
        acquired_at: Some(ts("2024-03-05 08:09:10")),
        host: Some("bastion-2".to_string()),
        pid: Some(4242),
    };

    let text = record.render();
    assert!(text.starts_with("Timestamp: 2024-03-05 08:09:10\nUsername: carol\n"));
    assert_eq!(HolderRecord::parse(&text), record);
}

#[test]
fn test_elapsed_for_contention_scenario() {
    let record = HolderRecord::parse("Timestamp: 2024-01-01 10:00:00\nUsername: alice\n");

    let elapsed = record.elapsed_at(ts("2024-01-01 10:01:10"));

    assert_eq!(elapsed, Some(Duration::from_secs(70)));
    assert_eq!(format_elapsed(elapsed), "00:01:10");
}

#[test]
fn test_elapsed_unknown_and_future_timestamps() {
    assert_eq!(HolderRecord::unknown().elapsed_at(ts("2024-01-01 10:00:00")), None);
    assert_eq!(format_elapsed(None), "unknown");

    let future = HolderRecord::parse("Timestamp: 2030-01-01 00:00:00\n");
    assert_eq!(
        future.elapsed_at(ts("2024-01-01 00:00:00")),
        Some(Duration::ZERO)
    );
}

#[test]
fn test_format_elapsed_past_a_day() {
    assert_eq!(format_elapsed(Some(Duration::from_secs(26 * 3600 + 61))), "26:01:01");
}

#[test]
fn test_registry_missing_file_reads_unknown() {
    let dir = TempDir::new().unwrap();
    let registry = HolderRegistry::new(dir.path().join("__pid_file__"));

    let record = registry.read();

    assert!(record.is_unknown());
    assert_eq!(record.elapsed_at(now()), None);
}

#[test]
fn test_registry_write_is_visible_to_another_reader() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("__pid_file__");
    let writer = HolderRegistry::new(&path);
    let reader = HolderRegistry::new(&path);

    writer.write("alice", ts("2024-01-01 10:00:00")).unwrap();
    let record = reader.read();

    assert_eq!(record.owner, "alice");
    assert_eq!(record.acquired_at, Some(ts("2024-01-01 10:00:00")));
    assert_eq!(record.pid, Some(std::process::id()));
}

#[test]
fn test_registry_overwrites_previous_holder() {
    let dir = TempDir::new().unwrap();
    let registry = HolderRegistry::new(dir.path().join("__pid_file__"));

    registry.write("alice", ts("2024-01-01 10:00:00")).unwrap();
    registry.write("bob", ts("2024-01-01 11:00:00")).unwrap();

    let content = std::fs::read_to_string(registry.path()).unwrap();
    assert!(!content.contains("alice"));
    assert_eq!(registry.read().owner, "bob");
}

#[test]
fn test_registry_degrades_after_truncation() {
    let dir = TempDir::new().unwrap();
    let registry = HolderRegistry::new(dir.path().join("__pid_file__"));
    registry.write("alice", now()).unwrap();

    std::fs::write(registry.path(), "").unwrap();
    assert!(registry.read().is_unknown());

    std::fs::remove_file(registry.path()).unwrap();
    assert!(registry.read().is_unknown());
}

#[test]
fn test_registry_write_into_missing_directory() {
    let dir = TempDir::new().unwrap();
    let registry = HolderRegistry::new(dir.path().join("gone").join("__pid_file__"));

    let err = registry.write("alice", now()).unwrap_err();

    assert!(matches!(err, OpgateError::PathUnavailable { .. }));
}

#[test]
fn test_stale_reason_for_dead_local_pid() {
    let record = HolderRecord {
        owner: "dave".to_string(),
        acquired_at: Some(ts("2024-01-01 10:00:00")),
        host: Some("bastion-1".to_string()),
        pid: Some(i32::MAX as u32),
    };

    let reason = record
        .stale_reason(ts("2024-01-01 10:00:05"), Duration::from_secs(3600), "bastion-1")
        .unwrap();
    assert!(reason.contains("no longer running"));

    // On another host the pid cannot be checked; only age counts.
    assert!(
        record
            .stale_reason(ts("2024-01-01 10:00:05"), Duration::from_secs(3600), "elsewhere")
            .is_none()
    );
}

#[test]
fn test_stale_reason_for_old_holder() {
    let record = HolderRecord::parse("Timestamp: 2024-01-01 10:00:00\nUsername: erin\n");

    let reason = record
        .stale_reason(ts("2024-01-01 12:00:00"), Duration::from_secs(3600), "bastion-1")
        .unwrap();

    assert!(reason.contains("02:00:00"));
}

#[test]
fn test_holder_display() {
    let record = HolderRecord {
        owner: "frank".to_string(),
        acquired_at: None,
        host: Some("bastion-3".to_string()),
        pid: Some(7),
    };
    assert_eq!(record.to_string(), "frank@bastion-3 (pid 7)");
    assert_eq!(HolderRecord::unknown().to_string(), "unknown");
}
