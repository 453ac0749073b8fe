// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scheduler leader lock: a single file,
//! `DATA_DIR/scheduler.lock`, that elects one active scheduler process
//! across a cluster.
//!
//! Acquisition uses `O_CREAT|O_EXCL` exactly like the process registry
//! — two schedulers racing to create the file can never both
//! win. Unlike the process registry, a lock holder can also *take over*
//! an existing lock once its `refreshed_at` goes stale, so a crashed
//! scheduler doesn't strand the cluster leaderless forever.

use crate::error::StoreError;
use dagctl_core::CoordinatorId;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub holder: CoordinatorId,
    pub host: String,
    pub acquired_at_ms: u64,
    pub refreshed_at_ms: u64,
}

fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("scheduler.lock")
}

fn write_record(path: &Path, record: &LockRecord) -> Result<(), StoreError> {
    let body = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt { path: path.to_path_buf(), line: 0, source: e })?;
    let mut file = OpenOptions::new().write(true).truncate(true).open(path).map_err(|e| StoreError::io(path, e))?;
    file.write_all(&body).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

fn read_record(path: &Path) -> Result<Option<LockRecord>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Outcome of one [`try_acquire`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// No lock existed, or the existing one was stale and has been taken
    /// over; the caller is now the leader.
    Acquired,
    /// A fresh lock is held by someone else.
    HeldByOther,
}

/// Attempt to become leader: create the lock if absent, or take over an
/// existing lock whose `refreshed_at` is older than `stale_after`.
/// Always rewrites the file with the caller's own identity on success.
pub fn try_acquire(
    data_dir: &Path,
    holder: CoordinatorId,
    host: &str,
    now_ms: u64,
    stale_after: Duration,
) -> Result<AcquireOutcome, StoreError> {
    let path = lock_path(data_dir);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let record = LockRecord { holder, host: host.to_string(), acquired_at_ms: now_ms, refreshed_at_ms: now_ms };

    match OpenOptions::new().create_new(true).write(true).open(&path) {
        Ok(mut file) => {
            let body = serde_json::to_vec(&record).map_err(|e| StoreError::Corrupt { path: path.clone(), line: 0, source: e })?;
            file.write_all(&body).map_err(|e| StoreError::io(&path, e))?;
            file.sync_all().map_err(|e| StoreError::io(&path, e))?;
            return Ok(AcquireOutcome::Acquired);
        }
        Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => return Err(StoreError::io(&path, e)),
        Err(_) => {}
    }

    let Some(existing) = read_record(&path)? else {
        // Malformed/unreadable record: treat as stale and take over.
        write_record(&path, &record)?;
        return Ok(AcquireOutcome::Acquired);
    };
    let stale = now_ms.saturating_sub(existing.refreshed_at_ms) > stale_after.as_millis() as u64;
    if !stale {
        return Ok(AcquireOutcome::HeldByOther);
    }
    write_record(&path, &record)?;
    Ok(AcquireOutcome::Acquired)
}

/// Refresh `refreshed_at_ms` for the current holder. Fails silently into
/// `Ok(false)` if someone else now holds the lock (e.g. a takeover raced
/// with this refresh) so the caller can step down gracefully.
pub fn refresh(data_dir: &Path, holder: &CoordinatorId, now_ms: u64) -> Result<bool, StoreError> {
    let path = lock_path(data_dir);
    let Some(mut existing) = read_record(&path)? else { return Ok(false) };
    if existing.holder != *holder {
        return Ok(false);
    }
    existing.refreshed_at_ms = now_ms;
    write_record(&path, &existing)?;
    Ok(true)
}

/// Release the lock, but only if still held by `holder` — never
/// clobbers a takeover by another scheduler.
pub fn release(data_dir: &Path, holder: &CoordinatorId) -> Result<(), StoreError> {
    let path = lock_path(data_dir);
    match read_record(&path)? {
        Some(existing) if existing.holder == *holder => {
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(StoreError::io(&path, e)),
            }
        }
        _ => Ok(()),
    }
}

/// The current lock holder, if any, regardless of staleness.
pub fn current(data_dir: &Path) -> Result<Option<LockRecord>, StoreError> {
    read_record(&lock_path(data_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const STALE: Duration = Duration::from_secs(30);

    #[test]
    fn first_acquire_succeeds() {
        let dir = tempdir().unwrap();
        let id = CoordinatorId::new();
        let outcome = try_acquire(dir.path(), id, "host-a", 1_000, STALE).unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);
    }

    #[test]
    fn second_holder_blocked_while_fresh() {
        let dir = tempdir().unwrap();
        let a = CoordinatorId::new();
        let b = CoordinatorId::new();
        try_acquire(dir.path(), a, "host-a", 1_000, STALE).unwrap();
        let outcome = try_acquire(dir.path(), b, "host-b", 1_500, STALE).unwrap();
        assert_eq!(outcome, AcquireOutcome::HeldByOther);
    }

    #[test]
    fn takeover_succeeds_once_stale() {
        let dir = tempdir().unwrap();
        let a = CoordinatorId::new();
        let b = CoordinatorId::new();
        try_acquire(dir.path(), a, "host-a", 1_000, STALE).unwrap();
        let outcome = try_acquire(dir.path(), b, "host-b", 1_000 + STALE.as_millis() as u64 + 1, STALE).unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);
        assert_eq!(current(dir.path()).unwrap().unwrap().holder, b);
    }

    #[test]
    fn refresh_keeps_lock_fresh_against_takeover() {
        let dir = tempdir().unwrap();
        let a = CoordinatorId::new();
        let b = CoordinatorId::new();
        try_acquire(dir.path(), a, "host-a", 1_000, STALE).unwrap();
        assert!(refresh(dir.path(), &a, 1_000 + STALE.as_millis() as u64).unwrap());
        let outcome = try_acquire(dir.path(), b, "host-b", 1_000 + STALE.as_millis() as u64 + 1, STALE).unwrap();
        assert_eq!(outcome, AcquireOutcome::HeldByOther);
    }

    #[test]
    fn release_only_clears_own_holder() {
        let dir = tempdir().unwrap();
        let a = CoordinatorId::new();
        let b = CoordinatorId::new();
        try_acquire(dir.path(), a, "host-a", 1_000, STALE).unwrap();
        try_acquire(dir.path(), b, "host-b", 1_000 + STALE.as_millis() as u64 + 1, STALE).unwrap();
        release(dir.path(), &a).unwrap();
        assert_eq!(current(dir.path()).unwrap().unwrap().holder, b);
    }

    #[test]
    fn refresh_fails_for_non_holder() {
        let dir = tempdir().unwrap();
        let a = CoordinatorId::new();
        let b = CoordinatorId::new();
        try_acquire(dir.path(), a, "host-a", 1_000, STALE).unwrap();
        assert!(!refresh(dir.path(), &b, 1_100).unwrap());
    }
}
