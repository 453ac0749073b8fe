// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run-status store: one JSONL file per attempt,
//! appended with `O_APPEND` and `fsync`'d after every write so a reader
//! never observes a torn write. A crash mid-`write(2)` can still leave a
//! truncated trailing line; [`read_status`] discards it and returns the
//! last complete record.
//!
//! Layout under `DATA_DIR`:
//! ```text
//! dag-runs/<dag_name>/<yyyy>/<mm>/<dd>/<dag_run_id>/attempt-<n>/status.jsonl
//! dag-runs/<dag_name>/<yyyy>/<mm>/<dd>/<dag_run_id>/attempt-<n>/logs/<step>.out
//! dag-runs/<dag_name>/<yyyy>/<mm>/<dd>/<dag_run_id>/attempt-<n>/logs/<step>.err
//! ```
//!
//! The date partition is fixed at the run's first attempt and every
//! later attempt of the same run lands in that same partition — readers
//! that only know a `(dag_name, dag_run_id)` pair locate it by walking
//! the `yyyy/mm/dd` index rather than recomputing today's date.

use crate::error::StoreError;
use chrono::{DateTime, Datelike, Utc};
use dagctl_core::{AttemptOrdinal, DagRunId, DagRunRef, DagRunStatus};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// An open handle to one attempt's status log, ready to append.
pub struct AttemptHandle {
    dir: PathBuf,
    file: File,
}

fn dag_dir(data_dir: &Path, dag_name: &str) -> PathBuf {
    data_dir.join("dag-runs").join(dag_name)
}

/// Zero-padded `(yyyy, mm, dd)` for the UTC date of `epoch_ms`.
fn date_parts(epoch_ms: u64) -> (String, String, String) {
    let dt = DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64).unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH);
    (format!("{:04}", dt.year()), format!("{:02}", dt.month()), format!("{:02}", dt.day()))
}

/// List the directory entries under `path` that are themselves
/// directories, sorted lexicographically. An absent `path` yields no
/// entries rather than an error, since most of the index may not exist
/// yet for a DAG that has never run.
fn read_subdirs(path: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match fs::read_dir(path) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(path, e))?;
        if entry.file_type().map_err(|e| StoreError::io(path, e))?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Walk the `yyyy/mm/dd` index under a DAG's directory to find the run
/// directory for `dag_run_id`, wherever its date partition landed.
fn find_run_dir(data_dir: &Path, dag_name: &str, dag_run_id: &DagRunId) -> Result<Option<PathBuf>, StoreError> {
    for year in read_subdirs(&dag_dir(data_dir, dag_name))? {
        for month in read_subdirs(&year)? {
            for day in read_subdirs(&month)? {
                let run_dir = day.join(dag_run_id.as_str());
                if run_dir.is_dir() {
                    return Ok(Some(run_dir));
                }
            }
        }
    }
    Ok(None)
}

/// The run directory for `dag_run_id`: an existing date partition if one
/// is already on disk (so a later attempt of the same run lands beside
/// its earlier ones), otherwise a fresh partition dated from `now_ms`.
fn run_dir_for(data_dir: &Path, dag_name: &str, dag_run_id: &DagRunId, now_ms: u64) -> Result<PathBuf, StoreError> {
    if let Some(existing) = find_run_dir(data_dir, dag_name, dag_run_id)? {
        return Ok(existing);
    }
    let (y, m, d) = date_parts(now_ms);
    Ok(dag_dir(data_dir, dag_name).join(y).join(m).join(d).join(dag_run_id.as_str()))
}

fn attempt_dir_in(run_dir: &Path, attempt: AttemptOrdinal) -> PathBuf {
    run_dir.join(format!("attempt-{attempt}"))
}

fn status_path(attempt_dir: &Path) -> PathBuf {
    attempt_dir.join("status.jsonl")
}

/// Create (or reopen) the attempt directory and its `status.jsonl` for
/// appending. `now_ms` only matters for a run's very first attempt,
/// whose date partition it fixes; later attempts of the same run are
/// located via the existing partition regardless of `now_ms`.
pub fn open_attempt(
    data_dir: &Path,
    dag_name: &str,
    dag_run_id: &DagRunId,
    attempt: AttemptOrdinal,
    now_ms: u64,
) -> Result<AttemptHandle, StoreError> {
    let run_dir = run_dir_for(data_dir, dag_name, dag_run_id, now_ms)?;
    let dir = attempt_dir_in(&run_dir, attempt);
    fs::create_dir_all(dir.join("logs")).map_err(|e| StoreError::io(&dir, e))?;
    let path = status_path(&dir);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| StoreError::io(&path, e))?;
    Ok(AttemptHandle { dir, file })
}

/// The directory this attempt's logs and status live under.
pub fn attempt_log_dir(handle: &AttemptHandle) -> PathBuf {
    handle.dir.join("logs")
}

/// Append a full status snapshot, fsync'd before returning so a
/// subsequent crash cannot lose this write.
pub fn append(handle: &mut AttemptHandle, status: &DagRunStatus) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(status).map_err(|e| StoreError::Corrupt {
        path: handle.dir.clone(),
        line: 0,
        source: e,
    })?;
    line.push(b'\n');
    handle.file.write_all(&line).map_err(|e| StoreError::io(&handle.dir, e))?;
    handle.file.sync_all().map_err(|e| StoreError::io(&handle.dir, e))?;
    Ok(())
}

/// Read the last complete status record from an attempt's log. Discards
/// a truncated trailing line rather than erroring, since a torn write can
/// only ever affect the newest record and the previous one remains
/// authoritative.
pub fn read_status(path: &Path) -> Result<Option<DagRunStatus>, StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let reader = BufReader::new(file);
    let mut last_valid = None;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| StoreError::io(path, e))?;
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<DagRunStatus>(&line) {
            Ok(status) => last_valid = Some(status),
            Err(e) => {
                tracing::warn!(path = %path.display(), line = idx, error = %e, "discarding truncated status record");
            }
        }
    }
    Ok(last_valid)
}

/// Find a specific attempt's current status, locating its run directory
/// by walking the date index.
pub fn find_attempt(
    data_dir: &Path,
    dag_name: &str,
    dag_run_id: &DagRunId,
    attempt: AttemptOrdinal,
) -> Result<Option<DagRunStatus>, StoreError> {
    let Some(run_dir) = find_run_dir(data_dir, dag_name, dag_run_id)? else { return Ok(None) };
    read_status(&status_path(&attempt_dir_in(&run_dir, attempt)))
}

/// The highest-numbered attempt directly under `run_dir` and its status.
fn latest_attempt_in(run_dir: &Path) -> Result<Option<(AttemptOrdinal, DagRunStatus)>, StoreError> {
    let entries = match fs::read_dir(run_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(run_dir, e)),
    };

    let mut best: Option<u32> = None;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(run_dir, e))?;
        if let Some(n) = entry
            .file_name()
            .to_str()
            .and_then(|s| s.strip_prefix("attempt-"))
            .and_then(|n| n.parse::<u32>().ok())
        {
            best = Some(best.map_or(n, |b| b.max(n)));
        }
    }

    let Some(n) = best else { return Ok(None) };
    let attempt = AttemptOrdinal(n);
    let status = read_status(&status_path(&attempt_dir_in(run_dir, attempt)))?;
    Ok(status.map(|s| (attempt, s)))
}

/// Find the highest-numbered attempt for a run and its current status,
/// locating its run directory by walking the date index.
pub fn latest_attempt(
    data_dir: &Path,
    dag_name: &str,
    dag_run_id: &DagRunId,
) -> Result<Option<(AttemptOrdinal, DagRunStatus)>, StoreError> {
    let Some(run_dir) = find_run_dir(data_dir, dag_name, dag_run_id)? else { return Ok(None) };
    latest_attempt_in(&run_dir)
}

/// List the latest status of every run recorded for `dag_name`, most
/// recently started first. Walks the full `yyyy/mm/dd` date index.
pub fn list_statuses(data_dir: &Path, dag_name: &str) -> Result<Vec<DagRunStatus>, StoreError> {
    let mut statuses = Vec::new();
    for year in read_subdirs(&dag_dir(data_dir, dag_name))? {
        for month in read_subdirs(&year)? {
            for day in read_subdirs(&month)? {
                for run_dir in read_subdirs(&day)? {
                    if let Some((_, status)) = latest_attempt_in(&run_dir)? {
                        statuses.push(status);
                    }
                }
            }
        }
    }
    statuses.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
    Ok(statuses)
}

/// Find the status of a child run spawned from `parent`'s `step_name`
/// node (sub-DAG/parallel fanout), by following the recorded child ref.
pub fn find_child_dag_run_status(
    data_dir: &Path,
    parent: &DagRunStatus,
    step_name: &str,
) -> Result<Vec<DagRunStatus>, StoreError> {
    let Some(node) = parent.node(step_name) else { return Ok(Vec::new()) };
    let mut out = Vec::with_capacity(node.children.len());
    for child in &node.children {
        if let Some((_, status)) = latest_attempt(data_dir, &child.dag_name, &child.dag_run_id)? {
            out.push(status);
        }
    }
    Ok(out)
}

/// Delete run directories whose latest attempt finished more than
/// `retention_days` ago, scanning the full `yyyy/mm/dd` date-partitioned
/// prefix. `0` disables retention (nothing is deleted). Empty date
/// directories left behind by a fully-swept day/month/year are pruned
/// too, so the index doesn't accumulate empty shells forever.
pub fn gc_expired(data_dir: &Path, dag_name: &str, retention_days: i64, now_ms: u64) -> Result<usize, StoreError> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let cutoff_ms = now_ms.saturating_sub(retention_days as u64 * 24 * 60 * 60 * 1000);

    let mut removed = 0;
    for year in read_subdirs(&dag_dir(data_dir, dag_name))? {
        for month in read_subdirs(&year)? {
            for day in read_subdirs(&month)? {
                for run_dir in read_subdirs(&day)? {
                    if let Some((_, status)) = latest_attempt_in(&run_dir)? {
                        if status.status.is_terminal() && status.finished_at_ms.map(|t| t < cutoff_ms).unwrap_or(false) {
                            fs::remove_dir_all(&run_dir).map_err(|e| StoreError::io(&run_dir, e))?;
                            removed += 1;
                        }
                    }
                }
                let _ = fs::remove_dir(&day);
            }
            let _ = fs::remove_dir(&month);
        }
        let _ = fs::remove_dir(&year);
    }
    Ok(removed)
}
