// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run executor (C5, ): drives one DAG run from its
//! first attempt to a terminal [`DagRunStatus`] — admits params, walks
//! the step graph honoring `depends`/preconditions/retry/repeat,
//! propagates a full status snapshot to C2 on every transition, and
//! records liveness in C3 for the duration.

use crate::context::RunContext;
use crate::error::RunError;
use crate::precondition;
use crate::step::{self, PolicyOutcome};
use crate::subdag;
use crate::vars::VarScope;
use dagctl_core::{
    AttemptOrdinal, Clock, Dag, DagRunRef, DagRunStatus, DagRunStatusKind, Node, NodeStatus, Step,
    StepExec,
};
use dagctl_executor::{ExecContext, DEFAULT_EXECUTOR};
use dagctl_spec::template;
use dagctl_store::{procreg, runstatus};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Boxed-future wrapper so a sub-DAG step can recurse into [`run`]
/// without an unbounded generic.
pub fn run_boxed<C: Clock>(
    ctx: Arc<RunContext<C>>,
    dag: Dag,
    dag_run_ref: DagRunRef,
    params: HashMap<String, String>,
    parent_ref: Option<DagRunRef>,
    root_ref: DagRunRef,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = Result<DagRunStatus, RunError>> + Send>> {
    Box::pin(run(ctx, dag, dag_run_ref, params, parent_ref, root_ref, cancel))
}

/// Execute one step outside of a full DAG run, for a worker that picked
/// it up from the coordinator plane. Recurses through the same [`run_one_step`] path a local
/// run would use, so a `SubDag`/`Parallel` step dispatched to a worker
/// still walks its child graph the normal way once it lands here — it
/// just does so under a worker-local scratch log directory rather than
/// the originating run's attempt directory.
pub async fn run_dispatched_step<C: Clock>(
    ctx: Arc<RunContext<C>>,
    step: Step,
    params: HashMap<String, String>,
    dag_run_ref: DagRunRef,
    cancel: CancellationToken,
) -> PolicyOutcome {
    let log_dir = ctx.data_dir.join("worker-scratch").join(&dag_run_ref.dag_name).join(dag_run_ref.dag_run_id.as_str());
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        return PolicyOutcome {
            status: NodeStatus::Failed,
            exit_code: None,
            output: HashMap::new(),
            error: Some(format!("failed to create worker scratch log dir: {e}")),
            retry_count: 0,
            done_count: 0,
            children: Vec::new(),
        };
    }
    let root_ref = dag_run_ref.clone();
    run_one_step(ctx, step, params, HashMap::new(), dag_run_ref, root_ref, log_dir, cancel).await
}

/// Effective run params: `default_params` < request `params` < the
/// DAG's own fixed `params` (the DAG author's values always win).
fn effective_params(dag: &Dag, request_params: &HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = dag.default_params.clone();
    merged.extend(request_params.clone());
    merged.extend(dag.params.clone());
    merged
}

/// Drive one DAG run (top-level or a recursive sub-DAG/parallel child)
/// to a terminal status.
#[allow(clippy::too_many_arguments)]
pub async fn run<C: Clock>(
    ctx: Arc<RunContext<C>>,
    dag: Dag,
    dag_run_ref: DagRunRef,
    params: HashMap<String, String>,
    parent_ref: Option<DagRunRef>,
    root_ref: DagRunRef,
    cancel: CancellationToken,
) -> Result<DagRunStatus, RunError> {
    let attempt = runstatus::latest_attempt(&ctx.data_dir, &dag_run_ref.dag_name, &dag_run_ref.dag_run_id)?
        .map(|(a, _)| a.next())
        .unwrap_or(AttemptOrdinal::FIRST);
    let started_at_ms = ctx.clock.epoch_ms();
    let mut handle =
        runstatus::open_attempt(&ctx.data_dir, &dag_run_ref.dag_name, &dag_run_ref.dag_run_id, attempt, started_at_ms)?;

    let merged_params = effective_params(&dag, &params);
    let mut status = DagRunStatus::new_queued(dag_run_ref.clone(), merged_params.clone().into_iter().collect());
    status.attempt = attempt;
    status.parent_ref = parent_ref;
    status.root_ref = root_ref.clone();
    status.status = DagRunStatusKind::Running;
    status.started_at_ms = Some(started_at_ms);
    status.nodes = dag.steps.iter().map(|s| Node::new(s.ref_name())).collect();
    runstatus::append(&mut handle, &status)?;

    procreg::register(
        &ctx.data_dir,
        &procreg::ProcRecord {
            dag_name: dag_run_ref.dag_name.clone(),
            dag_run_id: dag_run_ref.dag_run_id.clone(),
            attempt,
            pid: std::process::id(),
            started_at_ms: status.started_at_ms.unwrap_or(0),
        },
    )?;

    let heartbeat = spawn_heartbeat(ctx.clone(), dag_run_ref.clone());

    let mut var_scope = VarScope::new(&merged_params);
    let steps_result =
        run_steps(&ctx, &dag, &mut handle, &mut status, &dag_run_ref, &root_ref, &mut var_scope, cancel.clone()).await;
    let (run_result, aborted) = match steps_result {
        Ok(aborted) => (Ok(()), aborted),
        Err(e) => (Err(e), false),
    };

    heartbeat.abort();

    // Determined from step nodes alone, before handler nodes are appended —
    // a handler's own outcome never changes the run's pass/fail verdict.
    let run_status_kind =
        if cancel.is_cancelled() { DagRunStatusKind::Cancelled } else { finalize_status(&status.nodes, aborted) };

    let run_result = run_result.and({
        run_handlers(&ctx, &dag, &mut handle, &mut status, &dag_run_ref, &root_ref, &var_scope, run_status_kind, cancel.clone()).await
    });

    status.finished_at_ms = Some(ctx.clock.epoch_ms());
    status.status = run_status_kind;
    runstatus::append(&mut handle, &status)?;

    procreg::deregister(&ctx.data_dir, &dag_run_ref.dag_name, &dag_run_ref.dag_run_id)?;

    run_result?;
    Ok(status)
}

fn spawn_heartbeat<C: Clock>(ctx: Arc<RunContext<C>>, dag_run_ref: DagRunRef) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(ctx.heartbeat_interval).await;
            if let Err(e) = procreg::heartbeat(&ctx.data_dir, &dag_run_ref.dag_name, &dag_run_ref.dag_run_id) {
                tracing::warn!(error = %e, run = %dag_run_ref, "failed to refresh process-registry heartbeat");
            }
        }
    })
}

/// Whether a just-finished step's terminal status should cascade a
/// cancel to every step not yet started.
fn should_abort(step: &Step, node_status: NodeStatus) -> bool {
    match node_status {
        NodeStatus::Failed => !step.continue_on.failure,
        NodeStatus::Skipped => !step.continue_on.skipped,
        _ => false,
    }
}

/// Overall run status: `Succeeded` if nothing
/// failed and no cascade-abort happened; `Failed` if a cascade-abort
/// happened or nothing succeeded; `PartiallySucceeded` only when
/// `continueOn` let the run keep going past a failure/skip and at least
/// one step still succeeded.
fn finalize_status(nodes: &[Node], aborted: bool) -> DagRunStatusKind {
    let any_failed = nodes.iter().any(|n| n.status == NodeStatus::Failed);
    if !any_failed && !aborted {
        DagRunStatusKind::Succeeded
    } else if aborted {
        DagRunStatusKind::Failed
    } else {
        let any_succeeded = nodes.iter().any(|n| matches!(n.status, NodeStatus::Succeeded | NodeStatus::PartiallySucceeded));
        if any_succeeded {
            DagRunStatusKind::PartiallySucceeded
        } else {
            DagRunStatusKind::Failed
        }
    }
}

/// The step-graph scheduling loop: spawns every ready step (deps
/// terminal, not yet started), bounded by `dag.max_active_steps()`,
/// applying cascade-cancel once an unrecoverable step finishes.
#[allow(clippy::too_many_arguments)]
async fn run_steps<C: Clock>(
    ctx: &Arc<RunContext<C>>,
    dag: &Dag,
    handle: &mut runstatus::AttemptHandle,
    status: &mut DagRunStatus,
    dag_run_ref: &DagRunRef,
    root_ref: &DagRunRef,
    var_scope: &mut VarScope,
    cancel: CancellationToken,
) -> Result<bool, RunError> {
    let semaphore = Arc::new(Semaphore::new(dag.max_active_steps().unwrap_or(usize::MAX)));
    let log_dir = runstatus::attempt_log_dir(handle);
    let mut in_flight: HashSet<String> = HashSet::new();
    let mut join_set: JoinSet<(String, PolicyOutcome)> = JoinSet::new();
    let mut aborted = false;

    loop {
        for step in &dag.steps {
            let name = step.ref_name().to_string();
            if in_flight.contains(&name) {
                continue;
            }
            let current = status.node(&name).map(|n| n.status).unwrap_or(NodeStatus::None);
            if current != NodeStatus::None {
                continue;
            }
            if aborted || cancel.is_cancelled() {
                if let Some(node) = status.node_mut(&name) {
                    node.status = NodeStatus::Cancelled;
                    node.finished_at_ms = Some(ctx.clock.epoch_ms());
                }
                runstatus::append(handle, status)?;
                continue;
            }
            let deps_ready = step.depends.iter().all(|d| status.node(d).map(|n| n.status.is_terminal()).unwrap_or(false));
            if !deps_ready {
                continue;
            }

            in_flight.insert(name.clone());
            if let Some(node) = status.node_mut(&name) {
                node.status = NodeStatus::Running;
                node.started_at_ms = Some(ctx.clock.epoch_ms());
            }
            runstatus::append(handle, status)?;

            let step = step.clone();
            let ctx = ctx.clone();
            let vars = var_scope.as_map().clone();
            let mut env = dag.env.clone();
            env.extend(var_scope.as_env());
            let dag_run_ref = dag_run_ref.clone();
            let root_ref = root_ref.clone();
            let log_dir = log_dir.clone();
            let cancel = cancel.clone();
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await.expect("step semaphore is never closed");
                let outcome = run_one_step(ctx, step, vars, env, dag_run_ref, root_ref, log_dir, cancel).await;
                (name, outcome)
            });
        }

        if join_set.is_empty() {
            break;
        }

        let Some(joined) = join_set.join_next().await else { break };
        let (name, outcome) = joined.map_err(|e| {
            RunError::Executor(dagctl_executor::ExecutorError::Other(format!("step task panicked: {e}")))
        })?;
        in_flight.remove(&name);

        let step = dag.find_step(&name).cloned();
        let node_status = outcome.status;
        if node_status == NodeStatus::Succeeded {
            if let Some(step) = &step {
                if let Some(output_name) = &step.output {
                    let stdout_path = log_dir.join(format!("{name}.out"));
                    if let Some(value) = dagctl_executor::read_last_line(&stdout_path).await {
                        var_scope.record_output(output_name, value);
                    }
                }
            }
        }

        if let Some(node) = status.node_mut(&name) {
            node.status = node_status;
            node.finished_at_ms = Some(ctx.clock.epoch_ms());
            node.done_count = outcome.done_count;
            node.retry_count = outcome.retry_count;
            node.error = outcome.error;
            node.children = outcome.children;
            node.stdout_path = Some(log_dir.join(format!("{name}.out")));
            node.stderr_path = Some(log_dir.join(format!("{name}.err")));
        }
        runstatus::append(handle, status)?;

        if let Some(step) = &step {
            if should_abort(step, node_status) {
                tracing::warn!(step = %name, status = %node_status, run = %dag_run_ref, "aborting remaining steps");
                aborted = true;
            }
        }
    }

    Ok(aborted)
}

#[allow(clippy::too_many_arguments)]
async fn run_one_step<C: Clock>(
    ctx: Arc<RunContext<C>>,
    step: Step,
    vars: HashMap<String, String>,
    env: HashMap<String, String>,
    dag_run_ref: DagRunRef,
    root_ref: DagRunRef,
    log_dir: PathBuf,
    cancel: CancellationToken,
) -> PolicyOutcome {
    let stdout_path = log_dir.join(format!("{}.out", step.ref_name()));
    let stderr_path = log_dir.join(format!("{}.err", step.ref_name()));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    match precondition::all_true(&step.preconditions, &ctx.registry, &cwd, &env, &stdout_path, &stderr_path).await {
        Ok(true) => {}
        Ok(false) => {
            return PolicyOutcome {
                status: NodeStatus::Skipped,
                exit_code: None,
                output: HashMap::new(),
                error: None,
                retry_count: 0,
                done_count: 0,
                children: Vec::new(),
            };
        }
        Err(e) => {
            return PolicyOutcome {
                status: NodeStatus::Failed,
                exit_code: None,
                output: HashMap::new(),
                error: Some(format!("precondition error: {e}")),
                retry_count: 0,
                done_count: 0,
                children: Vec::new(),
            };
        }
    }

    let retry_policy = step.retry_policy.clone();
    let repeat_policy = step.repeat_policy.clone();
    let timeout = step.timeout_secs.map(Duration::from_secs);

    // `workerSelector` applies to any exec kind: the
    // whole step — Command, Script, SubDag, or Parallel alike — is handed
    // to the coordinator plane as one task instead of run in this
    // process. The worker that picks it up runs it the same way, so a
    // dispatched SubDag/Parallel step still recurses locally once it
    // lands on that worker.
    if !step.worker_selector.is_empty() {
        if let Err(e) = reject_if_hitl(&ctx, &step).await {
            return PolicyOutcome {
                status: NodeStatus::Failed,
                exit_code: None,
                output: HashMap::new(),
                error: Some(e.to_string()),
                retry_count: 0,
                done_count: 0,
                children: Vec::new(),
            };
        }
        return step::execute(
            retry_policy.as_ref(),
            repeat_policy.as_ref(),
            &ctx.registry,
            &cwd,
            &env,
            &stdout_path,
            &stderr_path,
            || {
                let ctx = ctx.clone();
                let step = step.clone();
                let vars = vars.clone();
                let dag_run_ref = dag_run_ref.clone();
                async move { dispatch_step(ctx, &step, vars, &dag_run_ref).await }
            },
        )
        .await;
    }

    match &step.exec {
        StepExec::Command { .. } | StepExec::Script { .. } => {
            let executor_name = step.executor_config.as_ref().map(|c| c.kind.clone()).unwrap_or_else(|| DEFAULT_EXECUTOR.to_string());
            let command = render_command(&step, &vars);
            step::execute(
                retry_policy.as_ref(),
                repeat_policy.as_ref(),
                &ctx.registry,
                &cwd,
                &env,
                &stdout_path,
                &stderr_path,
                || {
                    let registry = ctx.registry.clone();
                    let command = command.clone();
                    let cwd = cwd.clone();
                    let env = env.clone();
                    let stdout_path = stdout_path.clone();
                    let stderr_path = stderr_path.clone();
                    let cancel = cancel.clone();
                    let executor_name = executor_name.clone();
                    async move {
                        let executor = registry.get(&executor_name)?;
                        executor
                            .run(ExecContext { command, cwd, env, stdout_path, stderr_path, timeout, cancel, sub_dag: None })
                            .await
                    }
                },
            )
            .await
        }
        StepExec::SubDag { sub_dag } => {
            step::execute(
                retry_policy.as_ref(),
                repeat_policy.as_ref(),
                &ctx.registry,
                &cwd,
                &env,
                &stdout_path,
                &stderr_path,
                || {
                    let ctx = ctx.clone();
                    let sub_dag = sub_dag.clone();
                    let parent_ref = dag_run_ref.clone();
                    let root_ref = root_ref.clone();
                    let cancel = cancel.clone();
                    async move { subdag::run_sub_dag(ctx, &sub_dag, HashMap::new(), parent_ref, root_ref, cancel).await }
                },
            )
            .await
        }
        StepExec::Parallel { parallel } => {
            let sub_dag = parallel.sub_dag.clone();
            let items = parallel.items.clone();
            let max_concurrent = parallel.max_concurrent;
            step::execute(
                retry_policy.as_ref(),
                repeat_policy.as_ref(),
                &ctx.registry,
                &cwd,
                &env,
                &stdout_path,
                &stderr_path,
                || {
                    let ctx = ctx.clone();
                    let sub_dag = sub_dag.clone();
                    let items = items.clone();
                    let parent_ref = dag_run_ref.clone();
                    let root_ref = root_ref.clone();
                    let cancel = cancel.clone();
                    async move { subdag::run_parallel(ctx, &sub_dag, &items, max_concurrent, parent_ref, root_ref, cancel).await }
                },
            )
            .await
        }
    }
}

/// Reject dispatching a `SubDag`/`Parallel` step to a worker if its
/// target sub-DAG contains a HITL step.
/// Command/Script steps have nothing to check here.
async fn reject_if_hitl<C: Clock>(ctx: &Arc<RunContext<C>>, step: &Step) -> Result<(), RunError> {
    match &step.exec {
        StepExec::SubDag { sub_dag } => subdag::reject_if_hitl_dispatch(ctx, step, sub_dag).await,
        StepExec::Parallel { parallel } => subdag::reject_if_hitl_dispatch(ctx, step, &parallel.sub_dag).await,
        StepExec::Command { .. } | StepExec::Script { .. } => Ok(()),
    }
}

/// Hand one step off to the coordinator plane (C6) and translate the
/// worker's report back into an [`ExecOutcome`].
async fn dispatch_step<C: Clock>(
    ctx: Arc<RunContext<C>>,
    step: &Step,
    vars: HashMap<String, String>,
    dag_run_ref: &DagRunRef,
) -> Result<dagctl_executor::ExecOutcome, dagctl_executor::ExecutorError> {
    let dispatcher = ctx
        .dispatcher
        .clone()
        .ok_or_else(|| dagctl_executor::ExecutorError::Other(RunError::DispatchUnavailable { step: step.ref_name().to_string() }.to_string()))?;
    let outcome = dispatcher
        .dispatch(&dag_run_ref.dag_name, &dag_run_ref.dag_run_id, step, vars)
        .await
        .map_err(|e| dagctl_executor::ExecutorError::Other(e.to_string()))?;
    let node_status = if outcome.succeeded { NodeStatus::Succeeded } else { NodeStatus::Failed };
    Ok(dagctl_executor::ExecOutcome {
        exit_code: outcome.exit_code,
        output: outcome.output,
        node_status: Some(node_status),
        children: Vec::new(),
    })
}

/// Join a `Command`/`Script` step's declared parts into one shell
/// command line and interpolate `${var...}` references.
fn render_command(step: &Step, vars: &HashMap<String, String>) -> String {
    let raw = match &step.exec {
        StepExec::Command { command, args } if args.is_empty() => command.clone(),
        StepExec::Command { command, args } => {
            let quoted: Vec<String> = args.iter().map(|a| format!("'{}'", template::escape_for_shell(a))).collect();
            format!("{command} {}", quoted.join(" "))
        }
        StepExec::Script { script } => script.clone(),
        StepExec::SubDag { .. } | StepExec::Parallel { .. } => String::new(),
    };
    template::interpolate_shell(&raw, vars)
}

/// Run whichever of `onSuccess`/`onFailure`/`onCancel` matches the run's
/// current terminal status, recorded as an extra [`Node`] under its own
/// declared name, then always run `onExit`, recorded in the dedicated
/// `on_exit` field.
#[allow(clippy::too_many_arguments)]
async fn run_handlers<C: Clock>(
    ctx: &Arc<RunContext<C>>,
    dag: &Dag,
    handle: &mut runstatus::AttemptHandle,
    status: &mut DagRunStatus,
    dag_run_ref: &DagRunRef,
    root_ref: &DagRunRef,
    var_scope: &VarScope,
    run_status: DagRunStatusKind,
    cancel: CancellationToken,
) -> Result<(), RunError> {
    let conditional = match run_status {
        DagRunStatusKind::Succeeded | DagRunStatusKind::PartiallySucceeded => dag.handler_on.success.as_ref(),
        DagRunStatusKind::Failed => dag.handler_on.failure.as_ref(),
        DagRunStatusKind::Cancelled => dag.handler_on.cancel.as_ref(),
        _ => None,
    };

    let log_dir = runstatus::attempt_log_dir(handle);
    let env = dag.env.clone();
    let vars = var_scope.as_map().clone();

    if let Some(handler) = conditional {
        let node = run_handler_step(ctx, handler, &vars, &env, dag_run_ref, root_ref, &log_dir, cancel.clone()).await;
        status.nodes.push(node);
        runstatus::append(handle, status)?;
    }

    if let Some(handler) = &dag.handler_on.exit {
        let node = run_handler_step(ctx, handler, &vars, &env, dag_run_ref, root_ref, &log_dir, cancel).await;
        status.on_exit = Some(Box::new(node));
        runstatus::append(handle, status)?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_handler_step<C: Clock>(
    ctx: &Arc<RunContext<C>>,
    handler: &Step,
    vars: &HashMap<String, String>,
    env: &HashMap<String, String>,
    dag_run_ref: &DagRunRef,
    root_ref: &DagRunRef,
    log_dir: &std::path::Path,
    cancel: CancellationToken,
) -> Node {
    let mut node = Node::new(handler.ref_name());
    node.started_at_ms = Some(ctx.clock.epoch_ms());
    let outcome = run_one_step(
        ctx.clone(),
        handler.clone(),
        vars.clone(),
        env.clone(),
        dag_run_ref.clone(),
        root_ref.clone(),
        log_dir.to_path_buf(),
        cancel,
    )
    .await;
    node.status = outcome.status;
    node.finished_at_ms = Some(ctx.clock.epoch_ms());
    node.done_count = outcome.done_count;
    node.retry_count = outcome.retry_count;
    node.error = outcome.error;
    node.children = outcome.children;
    node.stdout_path = Some(log_dir.join(format!("{}.out", handler.ref_name())));
    node.stderr_path = Some(log_dir.join(format!("{}.err", handler.ref_name())));
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DagLoader;
    use async_trait::async_trait;
    use dagctl_core::{DagBuilder, DagRunId, FakeClock, StepBuilder};
    use dagctl_executor::ExecutorRegistry;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    struct NoSubDags;

    #[async_trait]
    impl DagLoader for NoSubDags {
        async fn load(&self, name: &str) -> Result<Dag, RunError> {
            Err(RunError::UnknownSubDag { step: "n/a".to_string(), sub_dag: name.to_string() })
        }
    }

    fn test_ctx(data_dir: PathBuf) -> Arc<RunContext<FakeClock>> {
        Arc::new(RunContext::new(data_dir, ExecutorRegistry::with_builtins(), FakeClock::new(), Arc::new(NoSubDags)))
    }

    #[tokio::test]
    async fn linear_success_runs_to_completion() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let step_a = StepBuilder::new("a").exec(StepExec::Command { command: "echo a".to_string(), args: Vec::new() }).build();
        let mut step_b = StepBuilder::new("b").exec(StepExec::Command { command: "echo b".to_string(), args: Vec::new() }).build();
        step_b.depends = BTreeSet::from(["a".to_string()]);
        let dag = DagBuilder::new("lin").steps(vec![step_a, step_b]).build();

        let dag_run_ref = DagRunRef::new("lin", DagRunId::new());
        let root_ref = dag_run_ref.clone();
        let status = run(ctx, dag, dag_run_ref, HashMap::new(), None, root_ref, CancellationToken::new()).await.unwrap();

        assert_eq!(status.status, DagRunStatusKind::Succeeded);
        assert_eq!(status.node("a").unwrap().status, NodeStatus::Succeeded);
        assert_eq!(status.node("b").unwrap().status, NodeStatus::Succeeded);
    }

    #[tokio::test]
    async fn failure_without_continue_on_cascades_cancel() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let step_a = StepBuilder::new("a").exec(StepExec::Command { command: "exit 1".to_string(), args: Vec::new() }).build();
        let mut step_b = StepBuilder::new("b").exec(StepExec::Command { command: "echo b".to_string(), args: Vec::new() }).build();
        step_b.depends = BTreeSet::from(["a".to_string()]);
        let step_c = StepBuilder::new("c").exec(StepExec::Command { command: "echo c".to_string(), args: Vec::new() }).build();
        let dag = DagBuilder::new("branching").steps(vec![step_a, step_b, step_c]).build();

        let dag_run_ref = DagRunRef::new("branching", DagRunId::new());
        let root_ref = dag_run_ref.clone();
        let status = run(ctx, dag, dag_run_ref, HashMap::new(), None, root_ref, CancellationToken::new()).await.unwrap();

        assert_eq!(status.status, DagRunStatusKind::Failed);
        assert_eq!(status.node("a").unwrap().status, NodeStatus::Failed);
        assert_eq!(status.node("b").unwrap().status, NodeStatus::Cancelled);
        assert_eq!(status.node("c").unwrap().status, NodeStatus::Succeeded);
    }

    #[tokio::test]
    async fn continue_on_failure_lets_dependents_run_as_partial_success() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let mut step_a = StepBuilder::new("a").exec(StepExec::Command { command: "exit 1".to_string(), args: Vec::new() }).build();
        step_a.continue_on.failure = true;
        let mut step_b = StepBuilder::new("b").exec(StepExec::Command { command: "echo b".to_string(), args: Vec::new() }).build();
        step_b.depends = BTreeSet::from(["a".to_string()]);
        let dag = DagBuilder::new("tolerant").steps(vec![step_a, step_b]).build();

        let dag_run_ref = DagRunRef::new("tolerant", DagRunId::new());
        let root_ref = dag_run_ref.clone();
        let status = run(ctx, dag, dag_run_ref, HashMap::new(), None, root_ref, CancellationToken::new()).await.unwrap();

        assert_eq!(status.status, DagRunStatusKind::PartiallySucceeded);
        assert_eq!(status.node("b").unwrap().status, NodeStatus::Succeeded);
    }

    #[tokio::test]
    async fn failure_handler_runs_and_is_recorded() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let step_a = StepBuilder::new("a").exec(StepExec::Command { command: "exit 1".to_string(), args: Vec::new() }).build();
        let on_failure = StepBuilder::new("notify").exec(StepExec::Command { command: "echo notified".to_string(), args: Vec::new() }).build();
        let mut dag = DagBuilder::new("handled").steps(vec![step_a]).build();
        dag.handler_on.failure = Some(on_failure);

        let dag_run_ref = DagRunRef::new("handled", DagRunId::new());
        let root_ref = dag_run_ref.clone();
        let status = run(ctx, dag, dag_run_ref, HashMap::new(), None, root_ref, CancellationToken::new()).await.unwrap();

        assert_eq!(status.status, DagRunStatusKind::Failed);
        assert_eq!(status.nodes.iter().find(|n| n.step_name == "notify").unwrap().status, NodeStatus::Succeeded);
    }

    #[tokio::test]
    async fn precondition_false_skips_step_and_cascades_by_default() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let mut step_a = StepBuilder::new("a").exec(StepExec::Command { command: "echo a".to_string(), args: Vec::new() }).build();
        step_a.preconditions = vec![dagctl_core::Precondition { condition: "exit 1".to_string(), expected: None }];
        let mut step_b = StepBuilder::new("b").exec(StepExec::Command { command: "echo b".to_string(), args: Vec::new() }).build();
        step_b.depends = BTreeSet::from(["a".to_string()]);
        let dag = DagBuilder::new("gated").steps(vec![step_a, step_b]).build();

        let dag_run_ref = DagRunRef::new("gated", DagRunId::new());
        let root_ref = dag_run_ref.clone();
        let status = run(ctx, dag, dag_run_ref, HashMap::new(), None, root_ref, CancellationToken::new()).await.unwrap();

        assert_eq!(status.node("a").unwrap().status, NodeStatus::Skipped);
        assert_eq!(status.node("b").unwrap().status, NodeStatus::Cancelled);
        assert_eq!(status.status, DagRunStatusKind::Failed);
    }

    #[tokio::test]
    async fn continue_on_skipped_lets_dependents_run() {
        let dir = tempdir().unwrap();
        let ctx = test_ctx(dir.path().to_path_buf());

        let mut step_a = StepBuilder::new("a").exec(StepExec::Command { command: "echo a".to_string(), args: Vec::new() }).build();
        step_a.preconditions = vec![dagctl_core::Precondition { condition: "exit 1".to_string(), expected: None }];
        step_a.continue_on.skipped = true;
        let mut step_b = StepBuilder::new("b").exec(StepExec::Command { command: "echo b".to_string(), args: Vec::new() }).build();
        step_b.depends = BTreeSet::from(["a".to_string()]);
        let dag = DagBuilder::new("gated-tolerant").steps(vec![step_a, step_b]).build();

        let dag_run_ref = DagRunRef::new("gated-tolerant", DagRunId::new());
        let root_ref = dag_run_ref.clone();
        let status = run(ctx, dag, dag_run_ref, HashMap::new(), None, root_ref, CancellationToken::new()).await.unwrap();

        assert_eq!(status.node("a").unwrap().status, NodeStatus::Skipped);
        assert_eq!(status.node("b").unwrap().status, NodeStatus::Succeeded);
        assert_eq!(status.status, DagRunStatusKind::Succeeded);
    }
}
