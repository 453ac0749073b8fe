// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload types shared by [`crate::Request`] and [`crate::Response`].

use dagctl_core::{DagRunId, Step, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Canonicalize a `workerSelector`/worker-label key-value map into the
/// flat `"key=value"` string set the wire protocol matches on. A worker's labels
/// are a superset match against a step's selector, so both sides must
/// encode pairs identically.
pub fn labels_from_map(map: &HashMap<String, String>) -> BTreeSet<String> {
    map.iter().map(|(k, v)| format!("{k}={v}")).collect()
}

/// One unit of work handed to a worker in response to a `Poll`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchedStep {
    pub dag_name: String,
    pub dag_run_id: DagRunId,
    pub step: Step,
    pub params: BTreeMap<String, String>,
}

/// The outcome a worker reports back after executing a dispatched step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub dag_name: String,
    pub dag_run_id: DagRunId,
    pub step_name: String,
    pub exit_code: Option<i32>,
    pub succeeded: bool,
    #[serde(default)]
    pub output: HashMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A coordinator's view of one registered worker, for `GetWorkers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: WorkerId,
    pub labels: std::collections::BTreeSet<String>,
    pub last_poll_at_ms: u64,
    pub in_flight: usize,
}
