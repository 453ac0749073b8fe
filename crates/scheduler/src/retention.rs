// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention GC:
//! sweeps attempt directories past each DAG's `histRetentionDays`, plus
//! the service registry's long-dead members so it doesn't grow without
//! bound across scheduler/coordinator/worker restarts.

use crate::dagset::DagSet;
use crate::error::SchedulerError;
use dagctl_core::Clock;
use dagctl_store::{runstatus, svcreg};
use std::path::Path;
use std::time::Duration;

/// Every registered service name this scheduler knows to GC. Kept as a
/// fixed list rather than discovered from the filesystem, since an empty
/// `service-registry/<name>/` directory shouldn't need a scan to find.
const SERVICE_NAMES: [&str; 3] = ["scheduler", "coordinator", "worker"];

pub fn sweep<C: Clock>(data_dir: &Path, dags: &DagSet, clock: &C, service_gc_after: Duration) -> Result<usize, SchedulerError> {
    let now_ms = clock.epoch_ms();
    let mut removed = 0;

    for name in dags.names() {
        let Some(dag) = dags.get(&name) else { continue };
        removed += runstatus::gc_expired(data_dir, &name, dag.hist_retention_days, now_ms)?;
    }

    for service_name in SERVICE_NAMES {
        removed += svcreg::gc_expired(data_dir, service_name, service_gc_after)?;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::{DagRunId, DagRunRef, DagRunStatus, DagRunStatusKind, FakeClock};
    use tempfile::tempdir;

    #[test]
    fn sweep_removes_expired_runs_for_loaded_dags() {
        let dir = tempdir().unwrap();
        let clock = FakeClock::new();

        let dags_dir = dir.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        std::fs::write(
            dags_dir.join("lin.yaml"),
            b"name: lin\nhist_retention_days: 1\nsteps:\n  - name: a\n    command: echo hi\n",
        )
        .unwrap();
        let dags = DagSet::new(dags_dir);
        dags.reload().unwrap();

        let dag_run_id = DagRunId::new();
        let mut handle = runstatus::open_attempt(
            dir.path(),
            "lin",
            &dag_run_id,
            dagctl_core::AttemptOrdinal::FIRST,
            clock.epoch_ms(),
        )
        .unwrap();
        let mut status = DagRunStatus::new_queued(DagRunRef::new("lin", dag_run_id.clone()), Default::default());
        status.status = DagRunStatusKind::Succeeded;
        status.finished_at_ms = Some(clock.epoch_ms());
        runstatus::append(&mut handle, &status).unwrap();

        clock.advance(Duration::from_secs(3 * 24 * 60 * 60));
        let removed = sweep(dir.path(), &dags, &clock, Duration::from_secs(60)).unwrap();
        assert_eq!(removed, 1);
        assert!(runstatus::latest_attempt(dir.path(), "lin", &dag_run_id).unwrap().is_none());
    }
}
