// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared, read-only context threaded through every run of the run
//! executor, including recursive sub-DAG/parallel child runs.

use crate::error::RunError;
use async_trait::async_trait;
use dagctl_core::{Clock, Dag};
use dagctl_executor::ExecutorRegistry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Resolves a sub-DAG reference by name. The run executor itself has no
/// opinion on where DAG documents live — that's a concern of whatever
/// embeds it (the CLI, the scheduler's DAG directory scan).
#[async_trait]
pub trait DagLoader: Send + Sync {
    async fn load(&self, dag_name: &str) -> Result<Dag, RunError>;
}

/// Sends one step to the coordinator plane (C6) for execution on a
/// remote worker instead of running it in this process, used whenever a
/// step declares a non-empty `worker_selector`. This mirrors the wire protocol's
/// `DispatchedStep`/`StepResult` exactly: one `Step` in, one outcome
/// back — the worker runs it (recursing through its own run executor if
/// the step is a `SubDag`/`Parallel`) and reports only the summary.
/// Implemented by `dagctl-dispatch` on the run executor's behalf; this
/// crate only depends on the trait so `dagctl-dispatch` can depend on
/// `dagctl-engine` without a cycle.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(
        &self,
        dag_name: &str,
        dag_run_id: &dagctl_core::DagRunId,
        step: &dagctl_core::Step,
        params: HashMap<String, String>,
    ) -> Result<DispatchOutcome, RunError>;
}

/// A remote worker's report of one dispatched step, the engine-side
/// counterpart of `dagctl_wire::StepResult` (kept crate-local to avoid a
/// dependency on `dagctl-wire` from `dagctl-engine`).
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    pub output: HashMap<String, String>,
    pub error: Option<String>,
}

/// Everything a run (top-level or recursive child) needs beyond its own
/// DAG/params: where C2/C3 live, which executors are registered, how to
/// resolve sub-DAGs, and how to reach the dispatch plane.
pub struct RunContext<C: Clock> {
    pub data_dir: PathBuf,
    pub registry: ExecutorRegistry,
    pub clock: C,
    pub dag_loader: Arc<dyn DagLoader>,
    pub dispatcher: Option<Arc<dyn Dispatcher>>,
    pub heartbeat_interval: Duration,
}

impl<C: Clock> RunContext<C> {
    pub fn new(data_dir: PathBuf, registry: ExecutorRegistry, clock: C, dag_loader: Arc<dyn DagLoader>) -> Self {
        Self { data_dir, registry, clock, dag_loader, dispatcher: None, heartbeat_interval: Duration::from_secs(5) }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
