// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The process registry: one file per live run, whose
//! existence proves a singleton claim and whose mtime is a heartbeat.
//!
//! `Register` uses `O_CREAT|O_EXCL` so two processes racing to start the
//! same run id can never both win. A liveness check is "mtime newer than
//! `now - ttl`"; anything older is a zombie, reaped by the scheduler
//!.
//!
//! Layout: `DATA_DIR/proc/<dag_name>/<dag_run_id>.json`

use crate::error::StoreError;
use dagctl_core::{AttemptOrdinal, DagRunId};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcRecord {
    pub dag_name: String,
    pub dag_run_id: DagRunId,
    pub attempt: AttemptOrdinal,
    pub pid: u32,
    pub started_at_ms: u64,
}

fn record_path(data_dir: &Path, dag_name: &str, dag_run_id: &DagRunId) -> PathBuf {
    data_dir.join("proc").join(dag_name).join(format!("{dag_run_id}.json"))
}

/// Register a run as alive. Fails with [`StoreError::AlreadyRunning`] if a
/// record for this `(dag_name, dag_run_id)` already exists — the run
/// executor should treat that as "this run is already active".
pub fn register(data_dir: &Path, record: &ProcRecord) -> Result<(), StoreError> {
    let path = record_path(data_dir, &record.dag_name, &record.dag_run_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let mut file = match OpenOptions::new().create_new(true).write(true).open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(StoreError::AlreadyRunning {
                dag_name: record.dag_name.clone(),
                dag_run_id: record.dag_run_id.to_string(),
            });
        }
        Err(e) => return Err(StoreError::io(&path, e)),
    };
    let body = serde_json::to_vec(record).map_err(|e| StoreError::Corrupt { path: path.clone(), line: 0, source: e })?;
    file.write_all(&body).map_err(|e| StoreError::io(&path, e))?;
    file.sync_all().map_err(|e| StoreError::io(&path, e))?;
    Ok(())
}

/// Bump the record's mtime to prove liveness. The file content is not
/// rewritten — only the filesystem timestamp matters for the liveness
/// check.
pub fn heartbeat(data_dir: &Path, dag_name: &str, dag_run_id: &DagRunId) -> Result<(), StoreError> {
    let path = record_path(data_dir, dag_name, dag_run_id);
    let now = filetime::FileTime::now();
    filetime::set_file_mtime(&path, now).map_err(|e| StoreError::io(&path, e))
}

/// Remove the record; called on graceful terminal-status transitions.
pub fn deregister(data_dir: &Path, dag_name: &str, dag_run_id: &DagRunId) -> Result<(), StoreError> {
    let path = record_path(data_dir, dag_name, dag_run_id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(&path, e)),
    }
}

fn is_alive(path: &Path, ttl: Duration) -> Result<bool, StoreError> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mtime = meta.modified().map_err(|e| StoreError::io(path, e))?;
    Ok(mtime.elapsed().map(|age| age <= ttl).unwrap_or(true))
}

fn read_record(path: &Path) -> Result<Option<ProcRecord>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt { path: path.to_path_buf(), line: 0, source: e }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// All records still alive (heartbeat within `ttl`) across every DAG.
pub fn list_all_alive(data_dir: &Path, ttl: Duration) -> Result<Vec<ProcRecord>, StoreError> {
    let proc_dir = data_dir.join("proc");
    let dag_dirs = match fs::read_dir(&proc_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&proc_dir, e)),
    };

    let mut alive = Vec::new();
    for dag_dir in dag_dirs {
        let dag_dir = dag_dir.map_err(|e| StoreError::io(&proc_dir, e))?;
        if !dag_dir.file_type().map_err(|e| StoreError::io(&proc_dir, e))?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(dag_dir.path()).map_err(|e| StoreError::io(dag_dir.path(), e))? {
            let entry = entry.map_err(|e| StoreError::io(dag_dir.path(), e))?;
            let path = entry.path();
            if is_alive(&path, ttl)? {
                if let Some(record) = read_record(&path)? {
                    alive.push(record);
                }
            }
        }
    }
    Ok(alive)
}

/// Records alive for one DAG.
pub fn list_alive(data_dir: &Path, dag_name: &str, ttl: Duration) -> Result<Vec<ProcRecord>, StoreError> {
    Ok(list_all_alive(data_dir, ttl)?.into_iter().filter(|r| r.dag_name == dag_name).collect())
}

/// Count of currently-alive runs for one DAG, used to enforce
/// `max_active_runs` admission.
pub fn count_alive_by_dag(data_dir: &Path, dag_name: &str, ttl: Duration) -> Result<usize, StoreError> {
    Ok(list_alive(data_dir, dag_name, ttl)?.len())
}

/// Records whose heartbeat is stale: the run executor died without
/// deregistering.
pub fn list_zombies(data_dir: &Path, ttl: Duration) -> Result<Vec<ProcRecord>, StoreError> {
    let proc_dir = data_dir.join("proc");
    let dag_dirs = match fs::read_dir(&proc_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&proc_dir, e)),
    };

    let mut zombies = Vec::new();
    for dag_dir in dag_dirs {
        let dag_dir = dag_dir.map_err(|e| StoreError::io(&proc_dir, e))?;
        if !dag_dir.file_type().map_err(|e| StoreError::io(&proc_dir, e))?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(dag_dir.path()).map_err(|e| StoreError::io(dag_dir.path(), e))? {
            let entry = entry.map_err(|e| StoreError::io(dag_dir.path(), e))?;
            let path = entry.path();
            if !is_alive(&path, ttl)? {
                if let Some(record) = read_record(&path)? {
                    zombies.push(record);
                }
            }
        }
    }
    Ok(zombies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(dag_name: &str, dag_run_id: DagRunId) -> ProcRecord {
        ProcRecord { dag_name: dag_name.to_string(), dag_run_id, attempt: AttemptOrdinal::FIRST, pid: 4242, started_at_ms: 1 }
    }

    #[test]
    fn register_then_duplicate_fails() {
        let dir = tempdir().unwrap();
        let id = DagRunId::new();
        register(dir.path(), &record("lin", id)).unwrap();
        let err = register(dir.path(), &record("lin", id)).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyRunning { .. }));
    }

    #[test]
    fn register_then_deregister_allows_reregistration() {
        let dir = tempdir().unwrap();
        let id = DagRunId::new();
        register(dir.path(), &record("lin", id)).unwrap();
        deregister(dir.path(), "lin", &id).unwrap();
        register(dir.path(), &record("lin", id)).unwrap();
    }

    #[test]
    fn fresh_registration_counts_as_alive() {
        let dir = tempdir().unwrap();
        let id = DagRunId::new();
        register(dir.path(), &record("lin", id)).unwrap();
        assert_eq!(count_alive_by_dag(dir.path(), "lin", Duration::from_secs(60)).unwrap(), 1);
        assert!(list_zombies(dir.path(), Duration::from_secs(60)).unwrap().is_empty());
    }

    #[test]
    fn stale_heartbeat_counts_as_zombie_not_alive() {
        let dir = tempdir().unwrap();
        let id = DagRunId::new();
        register(dir.path(), &record("lin", id)).unwrap();
        let path = record_path(dir.path(), "lin", &id);
        let ancient = filetime::FileTime::from_unix_time(1, 0);
        filetime::set_file_mtime(&path, ancient).unwrap();

        assert_eq!(count_alive_by_dag(dir.path(), "lin", Duration::from_secs(30)).unwrap(), 0);
        let zombies = list_zombies(dir.path(), Duration::from_secs(30)).unwrap();
        assert_eq!(zombies.len(), 1);
        assert_eq!(zombies[0].dag_run_id, id);
    }

    #[test]
    fn heartbeat_refreshes_liveness() {
        let dir = tempdir().unwrap();
        let id = DagRunId::new();
        register(dir.path(), &record("lin", id)).unwrap();
        let path = record_path(dir.path(), "lin", &id);
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1, 0)).unwrap();
        heartbeat(dir.path(), "lin", &id).unwrap();
        assert_eq!(count_alive_by_dag(dir.path(), "lin", Duration::from_secs(30)).unwrap(), 1);
    }
}
