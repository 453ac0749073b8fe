// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loads every `*.yaml`/`*.yml` DAG document under a config directory
//! and keeps them in memory,
//! re-scanned on demand rather than watched — the scheduler's tick loop
//! already re-reads this set once per cycle, so a
//! separate filesystem watcher would be redundant complexity.

use crate::error::SchedulerError;
use async_trait::async_trait;
use dagctl_core::Dag;
use dagctl_engine::context::DagLoader;
use dagctl_engine::error::RunError;
use dagctl_spec::cron::CronSet;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// One loaded DAG plus its pre-parsed cron set, keyed by DAG name.
struct Entry {
    dag: Dag,
    cron: CronSet,
}

/// An in-memory directory of every DAG found under `dags_dir`, reloaded
/// by calling [`DagSet::reload`]. Implements [`DagLoader`] so the run
/// executor can resolve sub-DAG references against the same set the
/// scheduler uses for cron firing and admission.
pub struct DagSet {
    dags_dir: PathBuf,
    entries: RwLock<HashMap<String, Entry>>,
}

impl DagSet {
    pub fn new(dags_dir: PathBuf) -> Self {
        Self { dags_dir, entries: RwLock::new(HashMap::new()) }
    }

    /// Re-scan `dags_dir` for `.yaml`/`.yml` files, replacing the
    /// in-memory set entirely. A DAG that fails to parse is logged and
    /// skipped rather than aborting the whole reload — one bad document
    /// shouldn't take every other schedule down with it.
    pub fn reload(&self) -> Result<(), SchedulerError> {
        let mut next = HashMap::new();
        let read_dir = match std::fs::read_dir(&self.dags_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                *self.entries.write().expect("dagset lock poisoned") = next;
                return Ok(());
            }
            Err(e) => return Err(SchedulerError::Io(e)),
        };

        for entry in read_dir {
            let entry = entry.map_err(SchedulerError::Io)?;
            let path = entry.path();
            let is_yaml = matches!(path.extension().and_then(|e| e.to_str()), Some("yaml") | Some("yml"));
            if !is_yaml {
                continue;
            }
            match load_one(&path) {
                Ok((dag, cron)) => {
                    next.insert(dag.name.clone(), Entry { dag, cron });
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unparseable DAG document"),
            }
        }

        *self.entries.write().expect("dagset lock poisoned") = next;
        Ok(())
    }

    /// Every currently-loaded DAG name, for cron evaluation and
    /// retention GC sweeps.
    pub fn names(&self) -> Vec<String> {
        self.entries.read().expect("dagset lock poisoned").keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<Dag> {
        self.entries.read().expect("dagset lock poisoned").get(name).map(|e| e.dag.clone())
    }

    pub fn cron(&self, name: &str) -> Option<CronSet> {
        self.entries.read().expect("dagset lock poisoned").get(name).map(|e| e.cron.clone())
    }
}

fn load_one(path: &Path) -> Result<(Dag, CronSet), SchedulerError> {
    let bytes = std::fs::read(path).map_err(SchedulerError::Io)?;
    let dag = dagctl_spec::parse(&bytes).map_err(|source| SchedulerError::DagParse { path: path.to_path_buf(), source })?;
    let cron = CronSet::parse(&dag.schedule)?;
    Ok((dag, cron))
}

#[async_trait]
impl DagLoader for DagSet {
    async fn load(&self, dag_name: &str) -> Result<Dag, RunError> {
        self.get(dag_name).ok_or_else(|| RunError::UnknownSubDag { step: "n/a".to_string(), sub_dag: dag_name.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn reload_picks_up_valid_dags_and_skips_bad_ones() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("good.yaml"),
            b"name: good\nsteps:\n  - name: a\n    command: echo hi\n",
        )
        .unwrap();
        fs::write(dir.path().join("bad.yaml"), b"not: [valid").unwrap();
        fs::write(dir.path().join("ignored.txt"), b"irrelevant").unwrap();

        let set = DagSet::new(dir.path().to_path_buf());
        set.reload().unwrap();

        let names = set.names();
        assert_eq!(names, vec!["good".to_string()]);
        assert!(set.get("good").is_some());
        assert!(set.get("bad").is_none());
    }

    #[test]
    fn missing_dags_dir_yields_empty_set_not_error() {
        let dir = tempdir().unwrap();
        let set = DagSet::new(dir.path().join("does-not-exist"));
        set.reload().unwrap();
        assert!(set.names().is_empty());
    }
}
