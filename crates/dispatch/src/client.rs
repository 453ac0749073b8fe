// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The run executor's view of the dispatch plane: a
//! [`dagctl_engine::context::Dispatcher`] implementation that hands a
//! step to a remote coordinator instead of running it locally.

use crate::error::DispatchError;
use async_trait::async_trait;
use dagctl_core::{DagRunId, Step};
use dagctl_engine::context::{DispatchOutcome, Dispatcher};
use dagctl_engine::error::RunError;
use dagctl_wire::{labels_from_map, read_response, write_request, DispatchedStep, Request, Response};
use std::collections::{BTreeMap, HashMap};
use tokio::net::TcpStream;

/// Connects to one coordinator address per dispatch. A single
/// short-lived TCP connection per call mirrors `Request::Dispatch`'s
/// blocking-RPC shape — the connection just stays open until the
/// coordinator answers, the same way a worker's `Poll` connection does.
pub struct CoordinatorClient {
    coordinator_addr: String,
    dispatch_timeout_secs: u64,
}

impl CoordinatorClient {
    pub fn new(coordinator_addr: impl Into<String>, dispatch_timeout_secs: u64) -> Self {
        Self { coordinator_addr: coordinator_addr.into(), dispatch_timeout_secs }
    }
}

#[async_trait]
impl Dispatcher for CoordinatorClient {
    async fn dispatch(
        &self,
        dag_name: &str,
        dag_run_id: &DagRunId,
        step: &Step,
        params: HashMap<String, String>,
    ) -> Result<DispatchOutcome, RunError> {
        let dispatched = DispatchedStep {
            dag_name: dag_name.to_string(),
            dag_run_id: *dag_run_id,
            step: step.clone(),
            params: params.into_iter().collect::<BTreeMap<_, _>>(),
        };
        let selector = labels_from_map(&step.worker_selector);

        self.send_dispatch(dispatched, selector).await.map_err(|e| RunError::Dispatch(e.to_string()))
    }
}

impl CoordinatorClient {
    async fn send_dispatch(
        &self,
        step: DispatchedStep,
        selector: std::collections::BTreeSet<String>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut stream = TcpStream::connect(&self.coordinator_addr).await?;
        let request = Request::Dispatch { step, selector, timeout_secs: self.dispatch_timeout_secs };
        write_request(&mut stream, &request).await?;
        let response = read_response(&mut stream).await?;

        match response {
            Response::Dispatched(result) => Ok(DispatchOutcome {
                exit_code: result.exit_code,
                succeeded: result.succeeded,
                output: result.output,
                error: result.error,
            }),
            Response::NoMatch => Err(DispatchError::NoMatch),
            Response::Error { message } => Err(DispatchError::Remote(message)),
            other => Err(DispatchError::Remote(format!("unexpected coordinator response: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Coordinator;
    use dagctl_core::{StepExec, WorkerId};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;

    fn gpu_step() -> Step {
        let mut selector = HashMap::new();
        selector.insert("gpu".to_string(), "true".to_string());
        Step {
            name: "gpu-step".to_string(),
            id: None,
            exec: StepExec::Command { command: "true".to_string(), args: vec![] },
            depends: Default::default(),
            preconditions: vec![],
            repeat_policy: None,
            retry_policy: None,
            continue_on: Default::default(),
            output: None,
            worker_selector: selector,
            executor_config: None,
            timeout_secs: None,
            hitl: false,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_round_trips_through_a_live_coordinator() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let cancel = CancellationToken::new();
        let serve_cancel = cancel.clone();
        let serve_coordinator = coordinator.clone();
        let server = tokio::spawn(async move { serve_coordinator.serve(listener, serve_cancel).await });

        let mut labels = HashMap::new();
        labels.insert("gpu".to_string(), "true".to_string());
        labels.insert("region".to_string(), "us".to_string());
        let poll_labels = labels_from_map(&labels);
        let poller = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            write_request(
                &mut stream,
                &Request::Poll { worker_id: WorkerId::new(), labels: poll_labels, long_poll_secs: 5 },
            )
            .await
            .unwrap();
            read_response(&mut stream).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = CoordinatorClient::new(addr.to_string(), 5);
        let step = gpu_step();
        let dag_run_id = DagRunId::new();
        let dispatch = tokio::spawn(async move {
            client.send_dispatch(
                DispatchedStep { dag_name: "dist".to_string(), dag_run_id, step: step.clone(), params: BTreeMap::new() },
                labels_from_map(&step.worker_selector),
            )
            .await
        });

        let poll_response = poller.await.unwrap();
        let dispatched_step = match poll_response {
            Response::Dispatch(s) => *s,
            other => panic!("expected Dispatch, got {other:?}"),
        };

        let report = dagctl_wire::StepResult {
            dag_name: dispatched_step.dag_name.clone(),
            dag_run_id: dispatched_step.dag_run_id,
            step_name: dispatched_step.step.ref_name().to_string(),
            exit_code: Some(0),
            succeeded: true,
            output: Default::default(),
            error: None,
        };
        let mut report_stream = TcpStream::connect(addr).await.unwrap();
        write_request(&mut report_stream, &Request::Report(report)).await.unwrap();
        let _ = read_response(&mut report_stream).await.unwrap();

        let outcome = dispatch.await.unwrap().unwrap();
        assert!(outcome.succeeded);

        cancel.cancel();
        server.await.unwrap();
    }
}
