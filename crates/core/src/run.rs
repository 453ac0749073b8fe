// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run-status data model: the shape persisted by the
//! run-status store and exchanged between the run executor, the
//! coordinator, and the CLI.

use crate::define_id;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

define_id! {
    /// Identifies one run of a DAG.
    pub struct DagRunId("drn-");
}

define_id! {
    pub struct WorkerId("wkr-");
}

define_id! {
    pub struct CoordinatorId("cor-");
}

define_id! {
    pub struct ServiceInstanceId("svc-");
}

/// A retry attempt counter for a run, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttemptOrdinal(pub u32);

impl AttemptOrdinal {
    pub const FIRST: AttemptOrdinal = AttemptOrdinal(1);

    pub fn next(self) -> Self {
        AttemptOrdinal(self.0 + 1)
    }
}

impl std::fmt::Display for AttemptOrdinal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stable pointer to a run: which DAG, which run id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRunRef {
    pub dag_name: String,
    pub dag_run_id: DagRunId,
}

impl DagRunRef {
    pub fn new(dag_name: impl Into<String>, dag_run_id: DagRunId) -> Self {
        Self { dag_name: dag_name.into(), dag_run_id }
    }
}

impl std::fmt::Display for DagRunRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.dag_name, self.dag_run_id)
    }
}

/// Overall lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DagRunStatusKind {
    NotStarted,
    Queued,
    Running,
    Succeeded,
    PartiallySucceeded,
    Failed,
    Cancelled,
    /// Blocked on an unmet precondition/wait condition, distinct from
    /// `Queued` (admission-blocked) and `Running`.
    Wait,
}

crate::simple_display! {
    DagRunStatusKind {
        NotStarted => "not_started",
        Queued => "queued",
        Running => "running",
        Succeeded => "succeeded",
        PartiallySucceeded => "partially_succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
        Wait => "wait",
    }
}

impl DagRunStatusKind {
    /// A status from which no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DagRunStatusKind::Succeeded
                | DagRunStatusKind::PartiallySucceeded
                | DagRunStatusKind::Failed
                | DagRunStatusKind::Cancelled
        )
    }
}

/// Per-step lifecycle status within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    None,
    Running,
    Succeeded,
    /// A sub-DAG/parallel-fanout child set finished with a mix of
    /// outcomes. Terminal, but distinct from `Succeeded` so parents can
    /// tell an exact win from a partial one.
    PartiallySucceeded,
    Failed,
    Cancelled,
    Skipped,
    Waiting,
}

crate::simple_display! {
    NodeStatus {
        None => "none",
        Running => "running",
        Succeeded => "succeeded",
        PartiallySucceeded => "partially_succeeded",
        Failed => "failed",
        Cancelled => "cancelled",
        Skipped => "skipped",
        Waiting => "waiting",
    }
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded
                | NodeStatus::PartiallySucceeded
                | NodeStatus::Failed
                | NodeStatus::Cancelled
                | NodeStatus::Skipped
        )
    }
}

/// The status of a single step, as of the last observation recorded in
/// the status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub step_name: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Number of completed executions, including repeats.
    #[serde(default)]
    pub done_count: u32,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sub-DAG / parallel-fanout children spawned by this step.
    #[serde(default)]
    pub children: Vec<DagRunRef>,
}

impl Default for NodeStatus {
    fn default() -> Self {
        NodeStatus::None
    }
}

impl Node {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: NodeStatus::None,
            started_at_ms: None,
            finished_at_ms: None,
            done_count: 0,
            retry_count: 0,
            stdout_path: None,
            stderr_path: None,
            error: None,
            children: Vec::new(),
        }
    }
}

/// A full status snapshot for one run, as written to the run-status
/// store on every state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagRunStatus {
    #[serde(rename = "ref")]
    pub ref_: DagRunRef,
    pub attempt: AttemptOrdinal,
    pub status: DagRunStatusKind,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Step name -> node status, in declaration order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_ref: Option<DagRunRef>,
    pub root_ref: DagRunRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_exit: Option<Box<Node>>,
}

impl DagRunStatus {
    pub fn new_queued(ref_: DagRunRef, params: BTreeMap<String, String>) -> Self {
        let root_ref = ref_.clone();
        Self {
            ref_,
            attempt: AttemptOrdinal::FIRST,
            status: DagRunStatusKind::Queued,
            params,
            started_at_ms: None,
            finished_at_ms: None,
            nodes: Vec::new(),
            parent_ref: None,
            root_ref,
            on_exit: None,
        }
    }

    pub fn node(&self, step_name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.step_name == step_name)
    }

    pub fn node_mut(&mut self, step_name: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.step_name == step_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_run_status_kind_terminal_set() {
        assert!(DagRunStatusKind::Succeeded.is_terminal());
        assert!(DagRunStatusKind::Failed.is_terminal());
        assert!(!DagRunStatusKind::Running.is_terminal());
        assert!(!DagRunStatusKind::Wait.is_terminal());
    }

    #[test]
    fn attempt_ordinal_starts_at_one_and_increments() {
        assert_eq!(AttemptOrdinal::FIRST.0, 1);
        assert_eq!(AttemptOrdinal::FIRST.next().0, 2);
    }

    #[test]
    fn new_queued_seeds_root_ref_from_self() {
        let dag_ref = DagRunRef::new("lin", DagRunId::new());
        let status = DagRunStatus::new_queued(dag_ref.clone(), BTreeMap::new());
        assert_eq!(status.root_ref, dag_ref);
        assert_eq!(status.status, DagRunStatusKind::Queued);
        assert_eq!(status.attempt, AttemptOrdinal::FIRST);
    }

    #[test]
    fn node_lookup_by_step_name() {
        let mut status = DagRunStatus::new_queued(
            DagRunRef::new("lin", DagRunId::new()),
            BTreeMap::new(),
        );
        status.nodes.push(Node::new("build"));
        assert!(status.node("build").is_some());
        assert!(status.node("missing").is_none());
        status.node_mut("build").unwrap().status = NodeStatus::Running;
        assert_eq!(status.node("build").unwrap().status, NodeStatus::Running);
    }
}
