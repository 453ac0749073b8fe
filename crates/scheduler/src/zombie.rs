// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Zombie reaping: a process-registry
//! entry whose heartbeat has gone stale means its run executor died
//! without deregistering. The run is failed out synthetically and, if
//! the DAG declares a retry policy on its own steps, left for the next
//! cron/manual trigger rather than auto-resubmitted here — 
//! only requires re-enqueuing "if retry is configured", which for a
//! whole-run zombie means re-enqueuing a fresh attempt of the same run.

use crate::error::SchedulerError;
use dagctl_core::{Clock, DagRunRef, DagRunStatusKind, NodeStatus};
use dagctl_store::{procreg, queue, runstatus};
use std::path::Path;
use std::time::Duration;

/// One reap pass across every DAG's process-registry entries. Returns
/// the number of zombies reaped.
pub fn reap<C: Clock>(data_dir: &Path, ttl: Duration, clock: &C, requeue: bool) -> Result<usize, SchedulerError> {
    let zombies = procreg::list_zombies(data_dir, ttl)?;
    let mut reaped = 0;

    for record in zombies {
        let dag_run_ref = DagRunRef::new(record.dag_name.clone(), record.dag_run_id.clone());
        tracing::warn!(run = %dag_run_ref, attempt = %record.attempt, "reaping zombie run: heartbeat expired");

        if let Some((attempt, mut status)) = runstatus::latest_attempt(data_dir, &record.dag_name, &record.dag_run_id)? {
            let now_ms = clock.epoch_ms();
            for node in &mut status.nodes {
                if node.status == NodeStatus::Running {
                    node.status = NodeStatus::Failed;
                    node.finished_at_ms = Some(now_ms);
                    node.error = Some("zombie: process registry heartbeat expired".to_string());
                }
            }
            status.status = DagRunStatusKind::Failed;
            status.finished_at_ms = Some(now_ms);
            let mut handle = runstatus::open_attempt(data_dir, &record.dag_name, &record.dag_run_id, attempt, now_ms)?;
            runstatus::append(&mut handle, &status)?;
        }

        procreg::deregister(data_dir, &record.dag_name, &record.dag_run_id)?;

        if requeue {
            queue::enqueue(
                data_dir,
                &queue::QueueItem {
                    dag_name: record.dag_name,
                    dag_run_id: dagctl_core::DagRunId::new(),
                    enqueued_at_ms: clock.epoch_ms(),
                    params: Default::default(),
                },
            )?;
        }

        reaped += 1;
    }

    Ok(reaped)
}
