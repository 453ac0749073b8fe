// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The coordinator: an RPC server that matches dispatched steps to
//! long-polling workers by label superset.
//!
//! One spawned task per accepted connection, the handler races against
//! client disconnect, and a shared, lock-protected context holds
//! in-process state: the waiting-poller queue and in-flight dispatch
//! map. Framing is length-prefixed JSON over TCP (`dagctl-wire`), since
//! the coordinator and its workers are separate hosts rather than a
//! single local process.

use crate::error::DispatchError;
use crate::health::{Health, WorkerSnapshot};
use dagctl_core::{Clock, SystemClock, WorkerId};
use dagctl_wire::{read_request, write_response, DispatchedStep, Request, Response, StepResult};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Correlates a `Dispatch` request with the eventual `Report` for the
/// same step, since the two travel over separate connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DispatchKey {
    dag_name: String,
    dag_run_id: String,
    step_name: String,
}

impl DispatchKey {
    fn from_step(step: &DispatchedStep) -> Self {
        Self {
            dag_name: step.dag_name.clone(),
            dag_run_id: step.dag_run_id.to_string(),
            step_name: step.step.ref_name().to_string(),
        }
    }

    fn from_result(result: &StepResult) -> Self {
        Self { dag_name: result.dag_name.clone(), dag_run_id: result.dag_run_id.to_string(), step_name: result.step_name.clone() }
    }
}

/// Identifies one long-poll waiter, not one worker — a worker runs
/// `poller_count` concurrent polls that all share a `WorkerId`, so
/// eviction has to target a single poll, not every poll from that
/// worker.
type PollId = u64;

struct PollerWaiter {
    poll_id: PollId,
    worker_id: WorkerId,
    labels: BTreeSet<String>,
    tx: oneshot::Sender<DispatchedStep>,
}

struct InFlightDispatch {
    worker_id: WorkerId,
    result_tx: oneshot::Sender<StepResult>,
}

#[derive(Default)]
struct State {
    pollers: VecDeque<PollerWaiter>,
    in_flight: HashMap<DispatchKey, InFlightDispatch>,
    workers: HashMap<WorkerId, WorkerSnapshot>,
}

/// Shared coordinator state, cheap to clone and hand to each connection
/// task.
#[derive(Clone)]
pub struct Coordinator {
    state: Arc<Mutex<State>>,
    poller_arrived: Arc<Notify>,
    next_poll_id: Arc<AtomicU64>,
    clock: SystemClock,
    stale_after: Duration,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(Duration::from_secs(15))
    }
}

impl Coordinator {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            poller_arrived: Arc::new(Notify::new()),
            next_poll_id: Arc::new(AtomicU64::new(0)),
            clock: SystemClock,
            stale_after,
        }
    }

    /// Accept connections until `cancel` fires, spawning one task per
    /// connection.
    pub async fn serve(&self, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "coordinator accepted connection");
                            let this = self.clone();
                            tokio::spawn(async move {
                                if let Err(e) = this.handle_connection(stream).await {
                                    warn!(error = %e, "coordinator connection error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "coordinator accept error"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("coordinator shutting down");
                    return;
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), DispatchError> {
        let (mut reader, mut writer) = stream.split();
        let request = read_request(&mut reader).await?;
        let response = self.handle_request(request).await;
        write_response(&mut writer, &response).await?;
        Ok(())
    }

    async fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Hello { version } => Response::Hello { version },
            Request::Ping => Response::Pong,
            Request::GetWorkers => Response::Workers { workers: self.worker_summaries() },
            Request::Heartbeat { worker_id } => {
                self.touch_worker(worker_id, None);
                Response::Ok
            }
            Request::Poll { worker_id, labels, long_poll_secs } => self.handle_poll(worker_id, labels, long_poll_secs).await,
            Request::Dispatch { step, selector, timeout_secs } => self.handle_dispatch(step, selector, timeout_secs).await,
            Request::Report(result) => self.handle_report(result),
            Request::Shutdown => Response::ShuttingDown,
        }
    }

    fn touch_worker(&self, worker_id: WorkerId, labels: Option<BTreeSet<String>>) {
        let mut state = self.state.lock();
        let now = self.clock.epoch_ms();
        let entry = state.workers.entry(worker_id).or_insert_with(|| WorkerSnapshot {
            worker_id,
            labels: BTreeSet::new(),
            last_seen_ms: now,
            in_flight: 0,
        });
        entry.last_seen_ms = now;
        if let Some(labels) = labels {
            entry.labels = labels;
        }
    }

    fn worker_summaries(&self) -> Vec<dagctl_wire::WorkerSummary> {
        self.state
            .lock()
            .workers
            .values()
            .map(|w| dagctl_wire::WorkerSummary {
                worker_id: w.worker_id,
                labels: w.labels.clone(),
                last_poll_at_ms: w.last_seen_ms,
                in_flight: w.in_flight,
            })
            .collect()
    }

    /// Overall health rollup for observability, derived
    /// from how many registered workers have heartbeated recently.
    pub fn health(&self) -> Health {
        let now = self.clock.epoch_ms();
        let snapshots: Vec<WorkerSnapshot> = self.state.lock().workers.values().cloned().collect();
        crate::health::rollup(&snapshots, now, self.stale_after)
    }

    async fn handle_poll(&self, worker_id: WorkerId, labels: BTreeSet<String>, long_poll_secs: u64) -> Response {
        self.touch_worker(worker_id, Some(labels.clone()));

        let poll_id = self.next_poll_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            state.pollers.push_back(PollerWaiter { poll_id, worker_id, labels, tx });
        }
        self.poller_arrived.notify_waiters();

        match tokio::time::timeout(Duration::from_secs(long_poll_secs), rx).await {
            Ok(Ok(step)) => {
                self.bump_in_flight(worker_id, 1);
                Response::Dispatch(Box::new(step))
            }
            _ => {
                self.remove_poller(poll_id);
                Response::NoWork
            }
        }
    }

    fn remove_poller(&self, poll_id: PollId) {
        let mut state = self.state.lock();
        state.pollers.retain(|p| p.poll_id != poll_id);
    }

    fn bump_in_flight(&self, worker_id: WorkerId, delta: i64) {
        let mut state = self.state.lock();
        if let Some(w) = state.workers.get_mut(&worker_id) {
            w.in_flight = (w.in_flight as i64 + delta).max(0) as usize;
        }
    }

    fn match_poller_locked(state: &mut State, selector: &BTreeSet<String>) -> Option<PollerWaiter> {
        let pos = state.pollers.iter().position(|p| p.labels.is_superset(selector))?;
        state.pollers.remove(pos)
    }

    async fn handle_dispatch(&self, step: DispatchedStep, selector: BTreeSet<String>, timeout_secs: u64) -> Response {
        let key = DispatchKey::from_step(&step);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);

        // The `in_flight` entry for this dispatch must exist *before* the
        // matched poller can possibly respond to its own connection and
        // the worker report back — otherwise a fast-executing step could
        // race `handle_report` ahead of this function registering its
        // waiter.
        let (worker_id, result_rx) = loop {
            let poller = {
                let mut state = self.state.lock();
                Self::match_poller_locked(&mut state, &selector)
            };
            let Some(poller) = poller else {
                let notified = self.poller_arrived.notified();
                tokio::select! {
                    _ = notified => continue,
                    _ = tokio::time::sleep_until(deadline) => return Response::NoMatch,
                }
            };

            let worker_id = poller.worker_id;
            let (result_tx, result_rx) = oneshot::channel();
            self.state.lock().in_flight.insert(key.clone(), InFlightDispatch { worker_id, result_tx });

            if poller.tx.send(step.clone()).is_ok() {
                break (worker_id, result_rx);
            }
            // Poller disconnected between being matched and receiving the
            // step; undo the registration and keep waiting for another one.
            self.state.lock().in_flight.remove(&key);
        };

        match result_rx.await {
            Ok(result) => {
                self.bump_in_flight(worker_id, -1);
                Response::Dispatched(Box::new(result))
            }
            Err(_) => {
                self.bump_in_flight(worker_id, -1);
                self.state.lock().in_flight.remove(&key);
                Response::Error { message: "worker disconnected before reporting a result".to_string() }
            }
        }
    }

    fn handle_report(&self, result: StepResult) -> Response {
        let key = DispatchKey::from_result(&result);
        let in_flight = self.state.lock().in_flight.remove(&key);
        match in_flight {
            Some(entry) => {
                let _ = entry.result_tx.send(result);
                Response::Ok
            }
            None => {
                warn!(?key, "report for unknown or already-completed dispatch");
                Response::Ok
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::{DagRunId, Step, StepExec};
    use std::collections::BTreeMap;
    use tokio::net::TcpListener as TokioTcpListener;

    fn sample_step() -> DispatchedStep {
        DispatchedStep {
            dag_name: "dist".to_string(),
            dag_run_id: DagRunId::new(),
            step: Step {
                name: "gpu-step".to_string(),
                id: None,
                exec: StepExec::Command { command: "true".to_string(), args: vec![] },
                depends: Default::default(),
                preconditions: vec![],
                repeat_policy: None,
                retry_policy: None,
                continue_on: Default::default(),
                output: None,
                worker_selector: Default::default(),
                executor_config: None,
                timeout_secs: None,
                hitl: false,
            },
            params: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn poll_without_pending_dispatch_times_out_to_no_work() {
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let response = coordinator.handle_poll(WorkerId::new(), BTreeSet::new(), 0).await;
        assert!(matches!(response, Response::NoWork));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn one_pollers_timeout_does_not_evict_a_sibling_poll_from_the_same_worker() {
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let worker_id = WorkerId::new();
        let mut selector = BTreeSet::new();
        selector.insert("gpu=true".to_string());

        // One poll that times out immediately...
        let timed_out = coordinator.handle_poll(worker_id, selector.clone(), 0).await;
        assert!(matches!(timed_out, Response::NoWork));

        // ...must not have evicted this still-pending poll from the same worker.
        let long_coordinator = coordinator.clone();
        let long_selector = selector.clone();
        let long_poll = tokio::spawn(async move { long_coordinator.handle_poll(worker_id, long_selector, 5).await });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let step = sample_step();
        let dispatch_coordinator = coordinator.clone();
        let step_for_dispatch = step.clone();
        let dispatcher = tokio::spawn(async move { dispatch_coordinator.handle_dispatch(step_for_dispatch, selector, 5).await });

        let poll_response = long_poll.await.unwrap();
        assert!(matches!(poll_response, Response::Dispatch(_)), "sibling poll should still have been matched");

        let report = StepResult {
            dag_name: step.dag_name.clone(),
            dag_run_id: step.dag_run_id,
            step_name: step.step.ref_name().to_string(),
            exit_code: Some(0),
            succeeded: true,
            output: Default::default(),
            error: None,
        };
        assert!(matches!(coordinator.handle_report(report), Response::Ok));
        assert!(matches!(dispatcher.await.unwrap(), Response::Dispatched(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn dispatch_matches_waiting_poller_and_completes_on_report() {
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let mut selector = BTreeSet::new();
        selector.insert("gpu=true".to_string());

        let poll_coordinator = coordinator.clone();
        let poller = tokio::spawn(async move {
            poll_coordinator.handle_poll(WorkerId::new(), selector, 5).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let step = sample_step();
        let mut dispatch_selector = BTreeSet::new();
        dispatch_selector.insert("gpu=true".to_string());
        let dispatch_coordinator = coordinator.clone();
        let step_for_report = step.clone();
        let dispatcher = tokio::spawn(async move {
            dispatch_coordinator.handle_dispatch(step_for_report, dispatch_selector, 5).await
        });

        let poll_response = poller.await.unwrap();
        let dispatched_step = match poll_response {
            Response::Dispatch(s) => *s,
            other => panic!("expected Dispatch, got {other:?}"),
        };
        assert_eq!(dispatched_step.step.name, "gpu-step");

        let report = StepResult {
            dag_name: step.dag_name.clone(),
            dag_run_id: step.dag_run_id,
            step_name: step.step.ref_name().to_string(),
            exit_code: Some(0),
            succeeded: true,
            output: Default::default(),
            error: None,
        };
        let response = coordinator.handle_report(report);
        assert!(matches!(response, Response::Ok));

        let dispatch_response = dispatcher.await.unwrap();
        match dispatch_response {
            Response::Dispatched(result) => assert!(result.succeeded),
            other => panic!("expected Dispatched, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dispatch_with_no_matching_poller_times_out_to_no_match() {
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let mut selector = BTreeSet::new();
        selector.insert("gpu=true".to_string());
        let response = coordinator.handle_dispatch(sample_step(), selector, 0).await;
        assert!(matches!(response, Response::NoMatch));
    }

    #[tokio::test]
    async fn get_workers_reports_heartbeated_worker() {
        let coordinator = Coordinator::new(Duration::from_secs(15));
        coordinator.touch_worker(WorkerId::new(), Some(BTreeSet::new()));
        let response = coordinator.handle_request(Request::GetWorkers).await;
        match response {
            Response::Workers { workers } => assert_eq!(workers.len(), 1),
            other => panic!("expected Workers, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bind_and_serve_accepts_a_ping() {
        let listener = TokioTcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let coordinator = Coordinator::new(Duration::from_secs(15));
        let cancel = CancellationToken::new();
        let serve_cancel = cancel.clone();
        let serve_coordinator = coordinator.clone();
        let handle = tokio::spawn(async move { serve_coordinator.serve(listener, serve_cancel).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        dagctl_wire::write_request(&mut stream, &Request::Ping).await.unwrap();
        let response = dagctl_wire::read_response(&mut stream).await.unwrap();
        assert!(matches!(response, Response::Pong));

        cancel.cancel();
        handle.await.unwrap();
    }
}
