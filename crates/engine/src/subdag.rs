// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sub-DAG and Parallel step execution: neither runs a process directly — both recursively
//! drive another run of the run executor and fold the child's terminal
//! status back into an [`ExecOutcome`] via
//! [`dagctl_core::NodeStatus::PartiallySucceeded`]/`Waiting`, the way
//! `DetermineNodeStatus` folds child outcomes into a parent node.
//! Dispatching the step itself to a remote worker (non-empty `workerSelector`) is
//! decided one level up, in [`crate::run::run_one_step`], before either
//! of these functions is called — once a step is running here it always
//! recurses locally, whether that's in the originating process or inside
//! a worker that picked the step up over C6.

use crate::context::RunContext;
use crate::error::RunError;
use crate::run::run_boxed;
use dagctl_core::{Clock, Dag, DagRunId, DagRunRef, DagRunStatusKind, NodeStatus, Step};
use dagctl_executor::{ExecOutcome, ExecutorError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

fn first_hitl_step(dag: &Dag) -> Option<&str> {
    dag.steps.iter().find(|s| s.hitl).map(|s| s.name.as_str())
}

/// A step with a non-empty `workerSelector` whose exec kind is
/// `SubDag`/`Parallel` must be rejected at dispatch time if the target
/// sub-DAG contains a HITL step, since a dispatched task cannot stall
/// indefinitely on a remote worker.
pub async fn reject_if_hitl_dispatch<C: Clock>(
    ctx: &Arc<RunContext<C>>,
    step: &Step,
    sub_dag_name: &str,
) -> Result<(), RunError> {
    let dag = ctx.dag_loader.load(sub_dag_name).await?;
    if let Some(hitl_step) = first_hitl_step(&dag) {
        return Err(RunError::HitlDispatch {
            step: step.ref_name().to_string(),
            sub_dag: sub_dag_name.to_string(),
            hitl_step: hitl_step.to_string(),
        });
    }
    Ok(())
}

fn status_to_outcome(status: DagRunStatusKind, child: DagRunRef) -> Result<ExecOutcome, ExecutorError> {
    let node_status = match status {
        DagRunStatusKind::Succeeded => NodeStatus::Succeeded,
        DagRunStatusKind::PartiallySucceeded => NodeStatus::PartiallySucceeded,
        DagRunStatusKind::Wait => NodeStatus::Waiting,
        DagRunStatusKind::Cancelled => return Err(ExecutorError::Cancelled),
        _ => NodeStatus::Failed,
    };
    let exit_code = if node_status == NodeStatus::Failed { Some(1) } else { Some(0) };
    Ok(ExecOutcome { exit_code, node_status: Some(node_status), children: vec![child], ..Default::default() })
}

/// Run one sub-DAG attempt as a local recursive run of the run executor.
pub async fn run_sub_dag<C: Clock>(
    ctx: Arc<RunContext<C>>,
    sub_dag_name: &str,
    params: HashMap<String, String>,
    parent_ref: DagRunRef,
    root_ref: DagRunRef,
    cancel: CancellationToken,
) -> Result<ExecOutcome, ExecutorError> {
    let dag = ctx.dag_loader.load(sub_dag_name).await.map_err(|e| ExecutorError::Other(e.to_string()))?;
    let child_ref = DagRunRef::new(sub_dag_name.to_string(), DagRunId::new());
    let status = run_boxed(ctx, dag, child_ref.clone(), params, Some(parent_ref), root_ref, cancel)
        .await
        .map_err(|e| ExecutorError::Other(e.to_string()))?;
    status_to_outcome(status.status, child_ref)
}

/// Run a `Parallel` step: fan out one local child sub-DAG run per item
/// in `items`, bounded by `max_concurrent`. `Succeeded` only if every child succeeds; `PartiallySucceeded`
/// if any child partially succeeded or succeeded while at least one
/// other failed; `Failed` if none did.
pub async fn run_parallel<C: Clock>(
    ctx: Arc<RunContext<C>>,
    sub_dag_name: &str,
    items: &[HashMap<String, String>],
    max_concurrent: u32,
    parent_ref: DagRunRef,
    root_ref: DagRunRef,
    cancel: CancellationToken,
) -> Result<ExecOutcome, ExecutorError> {
    if items.is_empty() {
        return Ok(ExecOutcome { exit_code: Some(0), node_status: Some(NodeStatus::Succeeded), ..Default::default() });
    }

    let dag = ctx.dag_loader.load(sub_dag_name).await.map_err(|e| ExecutorError::Other(e.to_string()))?;

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1) as usize));
    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        let ctx = ctx.clone();
        let dag = dag.clone();
        let item = item.clone();
        let parent_ref = parent_ref.clone();
        let root_ref = root_ref.clone();
        let cancel = cancel.clone();
        let sem = semaphore.clone();
        let child_ref = DagRunRef::new(sub_dag_name.to_string(), DagRunId::new());

        handles.push(tokio::spawn(async move {
            let _permit = sem.acquire_owned().await;
            let result = run_boxed(ctx, dag, child_ref.clone(), item, Some(parent_ref), root_ref, cancel)
                .await
                .map_err(|e| ExecutorError::Other(e.to_string()));
            (child_ref, result)
        }));
    }

    let mut children = Vec::with_capacity(items.len());
    let mut succeeded = 0usize;
    let mut partial = 0usize;
    for handle in handles {
        match handle.await {
            Ok((child_ref, Ok(status))) => {
                children.push(child_ref);
                match status.status {
                    DagRunStatusKind::Succeeded => succeeded += 1,
                    DagRunStatusKind::PartiallySucceeded => partial += 1,
                    _ => {}
                }
            }
            Ok((child_ref, Err(_))) => children.push(child_ref),
            Err(_join_error) => {}
        }
    }

    let node_status = if succeeded == items.len() {
        NodeStatus::Succeeded
    } else if succeeded > 0 || partial > 0 {
        NodeStatus::PartiallySucceeded
    } else {
        NodeStatus::Failed
    };
    let exit_code = if node_status == NodeStatus::Failed { Some(1) } else { Some(0) };
    Ok(ExecOutcome { exit_code, node_status: Some(node_status), children, ..Default::default() })
}
