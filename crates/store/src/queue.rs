// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue store: pending runs wait here until the
//! scheduler admits them under `max_active_runs`.
//!
//! Items are files named `<zero-padded-epoch-millis>-<dag_run_id>.json`
//! under `DATA_DIR/queue/<dag_name>/`, so a directory listing is already
//! FIFO order. Dequeue claims the head item by renaming it to a
//! `.claimed` suffix — an atomic, crash-safe hand-off: a crash between
//! rename and the caller's admission decision just leaves a claimed item
//! that [`recover_stale_claims`] returns to the queue after `claim_ttl`.

use crate::error::StoreError;
use dagctl_core::DagRunId;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub dag_name: String,
    pub dag_run_id: DagRunId,
    pub enqueued_at_ms: u64,
    #[serde(default)]
    pub params: std::collections::BTreeMap<String, String>,
}

fn queue_dir(data_dir: &Path, dag_name: &str) -> PathBuf {
    data_dir.join("queue").join(dag_name)
}

fn item_filename(enqueued_at_ms: u64, dag_run_id: &DagRunId) -> String {
    format!("{enqueued_at_ms:020}-{dag_run_id}.json")
}

/// Append an item to the tail of the queue.
pub fn enqueue(data_dir: &Path, item: &QueueItem) -> Result<(), StoreError> {
    let dir = queue_dir(data_dir, &item.dag_name);
    fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
    let path = dir.join(item_filename(item.enqueued_at_ms, &item.dag_run_id));
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path).map_err(|e| StoreError::io(&path, e))?;
    let body = serde_json::to_vec(item).map_err(|e| StoreError::Corrupt { path: path.clone(), line: 0, source: e })?;
    file.write_all(&body).map_err(|e| StoreError::io(&path, e))?;
    file.sync_all().map_err(|e| StoreError::io(&path, e))?;
    Ok(())
}

/// Claim the oldest unclaimed item, if any, by renaming it into a
/// `.claimed` state. The caller must call [`remove`] once the item has
/// been admitted, or leave it for [`recover_stale_claims`] to requeue.
pub fn dequeue_head(data_dir: &Path, dag_name: &str) -> Result<Option<QueueItem>, StoreError> {
    let dir = queue_dir(data_dir, dag_name);
    let mut entries: Vec<PathBuf> = match fs::read_dir(&dir) {
        Ok(e) => e.filter_map(|r| r.ok()).map(|e| e.path()).collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };
    entries.retain(|p| p.extension().and_then(|e| e.to_str()) == Some("json"));
    entries.sort();

    for path in entries {
        let claimed_path = path.with_extension("json.claimed");
        match fs::rename(&path, &claimed_path) {
            Ok(()) => {
                let bytes = fs::read(&claimed_path).map_err(|e| StoreError::io(&claimed_path, e))?;
                let item: QueueItem = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Corrupt { path: claimed_path.clone(), line: 0, source: e })?;
                return Ok(Some(item));
            }
            // Another worker already claimed this item first; try the next.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io(&path, e)),
        }
    }
    Ok(None)
}

/// Remove a claimed (or unclaimed) item permanently, once it has been
/// admitted and handed to the run executor.
pub fn remove(data_dir: &Path, dag_name: &str, dag_run_id: &DagRunId, enqueued_at_ms: u64) -> Result<(), StoreError> {
    let dir = queue_dir(data_dir, dag_name);
    let base = item_filename(enqueued_at_ms, dag_run_id);
    for candidate in [dir.join(&base), dir.join(format!("{base}.claimed"))] {
        match fs::remove_file(&candidate) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(StoreError::io(&candidate, e)),
        }
    }
    Err(StoreError::QueueItemNotFound(dag_run_id.to_string()))
}

/// All items currently queued or claimed for `dag_name`, FIFO order.
pub fn list_by_dag_name(data_dir: &Path, dag_name: &str) -> Result<Vec<QueueItem>, StoreError> {
    let dir = queue_dir(data_dir, dag_name);
    let mut entries: Vec<PathBuf> = match fs::read_dir(&dir) {
        Ok(e) => e.filter_map(|r| r.ok()).map(|e| e.path()).collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };
    entries.sort();
    let mut out = Vec::with_capacity(entries.len());
    for path in entries {
        let bytes = fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        out.push(
            serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt { path: path.clone(), line: 0, source: e })?,
        );
    }
    Ok(out)
}

/// All queued items across every DAG, FIFO order within each DAG's own
/// queue (used by the global scheduler's round-robin admission pass).
pub fn all(data_dir: &Path) -> Result<Vec<QueueItem>, StoreError> {
    let queue_root = data_dir.join("queue");
    let dag_dirs = match fs::read_dir(&queue_root) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&queue_root, e)),
    };
    let mut out = Vec::new();
    for dag_dir in dag_dirs {
        let dag_dir = dag_dir.map_err(|e| StoreError::io(&queue_root, e))?;
        if let Some(name) = dag_dir.file_name().to_str() {
            out.extend(list_by_dag_name(data_dir, name)?);
        }
    }
    Ok(out)
}

/// Rename `.claimed` items older than `claim_ttl` back to unclaimed, so a
/// worker that died mid-admission doesn't strand the item forever.
pub fn recover_stale_claims(data_dir: &Path, dag_name: &str, claim_ttl: Duration) -> Result<usize, StoreError> {
    let dir = queue_dir(data_dir, dag_name);
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };

    let mut recovered = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
        let path = entry.path();
        if path.to_string_lossy().ends_with(".json.claimed") {
            let meta = fs::metadata(&path).map_err(|e| StoreError::io(&path, e))?;
            let age_ok = meta.modified().ok().and_then(|m| m.elapsed().ok()).map(|age| age > claim_ttl).unwrap_or(false);
            if age_ok {
                let restored = path.with_extension("");
                fs::rename(&path, &restored).map_err(|e| StoreError::io(&path, e))?;
                recovered += 1;
            }
        }
    }
    Ok(recovered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(dag_name: &str, at: u64) -> QueueItem {
        QueueItem { dag_name: dag_name.to_string(), dag_run_id: DagRunId::new(), enqueued_at_ms: at, params: Default::default() }
    }

    #[test]
    fn dequeue_returns_oldest_first() {
        let dir = tempdir().unwrap();
        let first = item("lin", 100);
        let second = item("lin", 200);
        enqueue(dir.path(), &first).unwrap();
        enqueue(dir.path(), &second).unwrap();

        let got = dequeue_head(dir.path(), "lin").unwrap().unwrap();
        assert_eq!(got.dag_run_id, first.dag_run_id);
    }

    #[test]
    fn dequeue_on_empty_queue_returns_none() {
        let dir = tempdir().unwrap();
        assert!(dequeue_head(dir.path(), "lin").unwrap().is_none());
    }

    #[test]
    fn claimed_item_is_not_redequeued_until_stale() {
        let dir = tempdir().unwrap();
        let only = item("lin", 100);
        enqueue(dir.path(), &only).unwrap();
        let claimed = dequeue_head(dir.path(), "lin").unwrap().unwrap();
        assert_eq!(claimed.dag_run_id, only.dag_run_id);
        assert!(dequeue_head(dir.path(), "lin").unwrap().is_none());
    }

    #[test]
    fn remove_clears_claimed_item() {
        let dir = tempdir().unwrap();
        let only = item("lin", 100);
        enqueue(dir.path(), &only).unwrap();
        dequeue_head(dir.path(), "lin").unwrap();
        remove(dir.path(), "lin", &only.dag_run_id, only.enqueued_at_ms).unwrap();
        assert!(list_by_dag_name(dir.path(), "lin").unwrap().is_empty());
    }

    #[test]
    fn list_by_dag_name_includes_claimed_items() {
        let dir = tempdir().unwrap();
        let only = item("lin", 100);
        enqueue(dir.path(), &only).unwrap();
        dequeue_head(dir.path(), "lin").unwrap();
        assert_eq!(list_by_dag_name(dir.path(), "lin").unwrap().len(), 1);
    }
}
