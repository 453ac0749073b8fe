// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admission: for each DAG with a
//! non-empty queue, admit items one at a time while the count of alive
//! runs stays under the DAG's `maxActiveRuns`, spawning a run executor
//! for each admitted item.

use crate::dagset::DagSet;
use crate::error::SchedulerError;
use dagctl_core::{Clock, DagRunRef};
use dagctl_engine::context::RunContext;
use dagctl_store::{procreg, queue};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Effective concurrency cap for a DAG: `None` means unbounded.
fn effective_limit(max_active_runs: i64) -> Option<usize> {
    if max_active_runs <= 0 {
        None
    } else {
        Some(max_active_runs as usize)
    }
}

/// One admission pass across every loaded DAG's queue. Returns the
/// number of runs admitted. Spawned run executors are detached —
/// the process's own `RunContext` + C2/C3 writes are the durable record
/// of their progress, not this function's return value.
pub async fn admit_ready<C: Clock>(
    data_dir: &Path,
    dags: &DagSet,
    ctx: &Arc<RunContext<C>>,
    cancel: &CancellationToken,
) -> Result<usize, SchedulerError> {
    let alive_ttl = std::time::Duration::from_secs(120);
    let mut admitted = 0;

    for name in dags.names() {
        let Some(dag) = dags.get(&name) else { continue };
        let limit = effective_limit(dag.max_active_runs);

        // Runs admitted earlier in this same pass haven't necessarily
        // registered in C3 yet (the run executor is a detached `tokio::spawn`
        // that only writes its process-registry entry once first polled), so
        // `CountAliveByDAG` alone undercounts. Track this pass's admissions
        // per DAG and add them to the alive count, per spec.md §4.7 step 3's
        // `L = CountAliveByDAG + count in-progress admissions`.
        let mut in_flight = 0usize;

        loop {
            if let Some(limit) = limit {
                let alive = procreg::count_alive_by_dag(data_dir, &name, alive_ttl)?;
                if alive + in_flight >= limit {
                    break;
                }
            }

            let Some(item) = queue::dequeue_head(data_dir, &name)? else { break };
            queue::remove(data_dir, &name, &item.dag_run_id, item.enqueued_at_ms)?;

            let dag_run_ref = DagRunRef::new(name.clone(), item.dag_run_id);
            let root_ref = dag_run_ref.clone();
            let params: std::collections::HashMap<String, String> = item.params.into_iter().collect();
            tracing::info!(run = %dag_run_ref, "admitting queued run");

            let ctx = ctx.clone();
            let dag = dag.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if let Err(e) = dagctl_engine::run::run(ctx, dag, dag_run_ref.clone(), params, None, root_ref, cancel).await {
                    tracing::error!(run = %dag_run_ref, error = %e, "admitted run ended in error");
                }
            });

            admitted += 1;
            in_flight += 1;
        }
    }

    Ok(admitted)
}
