// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The executor SPI: how the run executor turns one
//! step's declared command/script into a running process and an exit
//! outcome.

use crate::error::ExecutorError;
use async_trait::async_trait;
use dagctl_core::{DagRunRef, NodeStatus};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What an [`Executor`] implementation supports. The run executor
/// consults this before honoring a step's `timeout_secs` or attempting
/// mid-flight cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutorCapabilities {
    pub supports_cancel: bool,
    pub supports_timeout: bool,
}

/// Everything an executor needs to run one step attempt. `command` is
/// always a complete shell command line — the caller (the run executor)
/// is responsible for joining a `Step`'s `command`/`args` or `script`
/// into one string and interpolating `${var}` references before
/// building this context.
pub struct ExecContext {
    pub command: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
    /// Present iff this step's exec kind is `SubDag`/`Parallel`. `command`/`cwd`/`stdout_path`/`stderr_path` are still set to
    /// harmless defaults in that case so non-recursive executors can
    /// ignore this field entirely.
    pub sub_dag: Option<SubDagInvocation>,
}

/// Everything a recursive (sub-DAG/parallel) executor needs to spawn and
/// await a child run.
#[derive(Debug, Clone)]
pub struct SubDagInvocation {
    pub dag_name: String,
    pub params: HashMap<String, String>,
    pub parent_ref: DagRunRef,
    pub root_ref: DagRunRef,
    pub worker_selector: HashMap<String, String>,
    /// `Some` only for `Parallel` steps: one parameter overlay per
    /// fan-out item, merged over `params`. `None` for a plain sub-DAG.
    pub fan_out: Option<Vec<HashMap<String, String>>>,
    pub max_concurrent: u32,
}

/// The result of running one step attempt.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub exit_code: Option<i32>,
    /// Values captured for the step's declared `output` variable, if any.
    pub output: HashMap<String, String>,
    /// Overrides the pass/fail-from-exit-code status determination
    /// — set by recursive executors
    /// that can produce `PartiallySucceeded`/`Waiting` outcomes that a
    /// bare exit code cannot express.
    pub node_status: Option<NodeStatus>,
    /// Child runs spawned by this attempt (sub-DAG/parallel), recorded on
    /// the step's `Node::children` regardless of outcome.
    pub children: Vec<DagRunRef>,
}

impl ExecOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A pluggable way of running a step's command. Built-in
/// implementations live in this crate; custom types are registered into
/// an [`crate::registry::ExecutorRegistry`] by the process embedding it.
#[async_trait]
pub trait Executor: Send + Sync {
    fn capabilities(&self) -> ExecutorCapabilities;

    async fn run(&self, ctx: ExecContext) -> Result<ExecOutcome, ExecutorError>;
}
