// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker side of the coordinator/worker dispatch plane: `N` concurrent long-poll tasks against
//! one coordinator, each executing whatever step it's handed through
//! the same run-executor path a local run would use, plus a heartbeat
//! task that keeps both the coordinator's and the service registry's
//! view of this worker fresh.

use crate::error::DispatchError;
use dagctl_core::{Clock, DagRunRef, ServiceInstanceId, WorkerId};
use dagctl_engine::context::RunContext;
use dagctl_engine::run::run_dispatched_step;
use dagctl_wire::{read_response, write_request, Request, Response, StepResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Everything one worker process needs to keep `poller_count` long-poll
/// loops fed and its liveness published.
pub struct Worker<C: Clock> {
    worker_id: WorkerId,
    service_instance_id: ServiceInstanceId,
    coordinator_addr: String,
    labels: BTreeSet<String>,
    long_poll_secs: u64,
    poller_count: usize,
    heartbeat_interval: Duration,
    data_dir: std::path::PathBuf,
    ctx: Arc<RunContext<C>>,
}

impl<C: Clock + Send + Sync + 'static> Worker<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator_addr: impl Into<String>,
        labels: BTreeSet<String>,
        poller_count: usize,
        long_poll_secs: u64,
        heartbeat_interval: Duration,
        data_dir: std::path::PathBuf,
        ctx: Arc<RunContext<C>>,
    ) -> Self {
        Self {
            worker_id: WorkerId::new(),
            service_instance_id: ServiceInstanceId::new(),
            coordinator_addr: coordinator_addr.into(),
            labels,
            long_poll_secs,
            poller_count,
            heartbeat_interval,
            data_dir,
            ctx,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Run `poller_count` long-poll loops plus a heartbeat loop until
    /// `cancel` fires. Each poller runs independently — a step that
    /// takes a long time to execute only ties up the one task that
    /// picked it up, the other `poller_count - 1` keep polling.
    pub async fn serve(&self, cancel: CancellationToken) {
        let mut pollers = tokio::task::JoinSet::new();
        for _ in 0..self.poller_count.max(1) {
            let worker_id = self.worker_id;
            let coordinator_addr = self.coordinator_addr.clone();
            let labels = self.labels.clone();
            let long_poll_secs = self.long_poll_secs;
            let ctx = self.ctx.clone();
            let poller_cancel = cancel.clone();
            pollers.spawn(async move {
                poll_loop(worker_id, coordinator_addr, labels, long_poll_secs, ctx, poller_cancel).await;
            });
        }

        let heartbeat = {
            let worker_id = self.worker_id;
            let service_instance_id = self.service_instance_id;
            let coordinator_addr = self.coordinator_addr.clone();
            let data_dir = self.data_dir.clone();
            let interval = self.heartbeat_interval;
            let hb_cancel = cancel.clone();
            tokio::spawn(async move {
                heartbeat_loop(worker_id, service_instance_id, coordinator_addr, data_dir, interval, hb_cancel).await;
            })
        };

        cancel.cancelled().await;
        while pollers.join_next().await.is_some() {}
        let _ = heartbeat.await;
    }

    /// Register this worker in the service registry once, up front, so
    /// it shows up in `GetWorkers`-adjacent discovery even before its
    /// first heartbeat tick.
    pub fn register_in_service_registry(&self, host: &str, port: u16) -> Result<(), DispatchError> {
        dagctl_store::svcreg::register(
            &self.data_dir,
            &dagctl_store::svcreg::ServiceMember {
                service_name: "worker".to_string(),
                instance_id: self.service_instance_id,
                host: host.to_string(),
                port,
                started_at_ms: self.ctx.clock.epoch_ms(),
            },
        )?;
        Ok(())
    }
}

/// One long-poll cycle: connect, `Poll`, and on `Dispatch` run the step
/// locally and `Report` back over the same connection before looping.
/// A `NoWork` or connection error just retries after a short backoff —
/// the coordinator being briefly unreachable isn't fatal to a worker.
async fn poll_loop<C: Clock>(
    worker_id: WorkerId,
    coordinator_addr: String,
    labels: BTreeSet<String>,
    long_poll_secs: u64,
    ctx: Arc<RunContext<C>>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        match poll_once(worker_id, &coordinator_addr, &labels, long_poll_secs, &ctx, &cancel).await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(error = %e, worker = %worker_id, "poll cycle failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}

async fn poll_once<C: Clock>(
    worker_id: WorkerId,
    coordinator_addr: &str,
    labels: &BTreeSet<String>,
    long_poll_secs: u64,
    ctx: &Arc<RunContext<C>>,
    cancel: &CancellationToken,
) -> Result<(), DispatchError> {
    let mut stream = TcpStream::connect(coordinator_addr).await?;
    let request = Request::Poll { worker_id, labels: labels.clone(), long_poll_secs };
    write_request(&mut stream, &request).await?;
    let response = read_response(&mut stream).await?;

    let dispatched = match response {
        Response::Dispatch(step) => *step,
        Response::NoWork => return Ok(()),
        Response::Error { message } => return Err(DispatchError::Remote(message)),
        other => return Err(DispatchError::Remote(format!("unexpected coordinator response: {other:?}"))),
    };

    let dag_run_ref = DagRunRef::new(dispatched.dag_name.clone(), dispatched.dag_run_id);
    let step_name = dispatched.step.ref_name().to_string();
    let outcome =
        run_dispatched_step(ctx.clone(), dispatched.step, dispatched.params.into_iter().collect(), dag_run_ref, cancel.clone())
            .await;

    let result = StepResult {
        dag_name: dispatched.dag_name,
        dag_run_id: dispatched.dag_run_id,
        step_name,
        exit_code: outcome.exit_code,
        succeeded: outcome.status == dagctl_core::NodeStatus::Succeeded,
        output: outcome.output,
        error: outcome.error,
    };

    write_request(&mut stream, &Request::Report(result)).await?;
    let _ = read_response(&mut stream).await?;
    Ok(())
}

/// Refresh this worker's liveness on the coordinator (`Request::Heartbeat`)
/// and, independently, on the service registry — the two
/// are separate directories serving different readers (the coordinator's
/// poller-matching state vs. cluster-wide service discovery), so a failure
/// in one is logged and doesn't stop the other.
async fn heartbeat_loop(
    worker_id: WorkerId,
    service_instance_id: ServiceInstanceId,
    coordinator_addr: String,
    data_dir: std::path::PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => return,
        }

        if let Err(e) = heartbeat_coordinator(worker_id, &coordinator_addr).await {
            tracing::warn!(error = %e, worker = %worker_id, "coordinator heartbeat failed");
        }
        if let Err(e) = dagctl_store::svcreg::heartbeat(&data_dir, "worker", &service_instance_id) {
            tracing::debug!(error = %e, worker = %worker_id, "service registry heartbeat skipped");
        }
    }
}

async fn heartbeat_coordinator(worker_id: WorkerId, coordinator_addr: &str) -> Result<(), DispatchError> {
    let mut stream = TcpStream::connect(coordinator_addr).await?;
    write_request(&mut stream, &Request::Heartbeat { worker_id }).await?;
    let _ = read_response(&mut stream).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use async_trait::async_trait;
    use dagctl_core::{FakeClock, Step, StepBuilder, StepExec};
    use dagctl_engine::context::DagLoader;
    use dagctl_engine::error::RunError;
    use dagctl_executor::ExecutorRegistry;
    use dagctl_wire::labels_from_map;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    struct NoSubDags;

    #[async_trait]
    impl DagLoader for NoSubDags {
        async fn load(&self, name: &str) -> Result<dagctl_core::Dag, RunError> {
            Err(RunError::UnknownSubDag { step: "n/a".to_string(), sub_dag: name.to_string() })
        }
    }

    fn gpu_step() -> Step {
        let mut selector = HashMap::new();
        selector.insert("gpu".to_string(), "true".to_string());
        let mut step = StepBuilder::new("gpu-step").exec(StepExec::Command { command: "echo hi".to_string(), args: vec![] }).build();
        step.worker_selector = selector;
        step
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn worker_executes_dispatched_step_and_reports_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let cancel = CancellationToken::new();
        let serve_cancel = cancel.clone();
        let serve_coordinator = coordinator.clone();
        let server = tokio::spawn(async move { serve_coordinator.serve(listener, serve_cancel).await });

        let dir = tempdir().unwrap();
        let ctx = Arc::new(RunContext::new(
            dir.path().to_path_buf(),
            ExecutorRegistry::with_builtins(),
            FakeClock::new(),
            Arc::new(NoSubDags),
        ));
        let labels = labels_from_map(&{
            let mut m = HashMap::new();
            m.insert("gpu".to_string(), "true".to_string());
            m
        });
        let worker = Worker::new(addr.to_string(), labels, 1, 5, Duration::from_secs(30), dir.path().to_path_buf(), ctx);
        let worker_cancel = cancel.clone();
        let worker_handle = tokio::spawn(async move { worker.serve(worker_cancel).await });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let step = gpu_step();
        let selector = labels_from_map(&step.worker_selector);
        let dag_run_id = dagctl_core::DagRunId::new();
        write_request(
            &mut stream,
            &Request::Dispatch {
                step: dagctl_wire::DispatchedStep {
                    dag_name: "dist".to_string(),
                    dag_run_id,
                    step,
                    params: Default::default(),
                },
                selector,
                timeout_secs: 5,
            },
        )
        .await
        .unwrap();
        let response = read_response(&mut stream).await.unwrap();
        let result = match response {
            Response::Dispatched(result) => *result,
            other => panic!("expected Dispatched, got {other:?}"),
        };
        assert!(result.succeeded);

        cancel.cancel();
        worker_handle.await.unwrap();
        server.await.unwrap();
    }
}
