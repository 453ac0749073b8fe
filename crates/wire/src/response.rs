// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::{DispatchedStep, StepResult, WorkerSummary};
use serde::{Deserialize, Serialize};

/// A message sent from the coordinator back to a worker, run executor,
/// or CLI client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success with no payload.
    Ok,

    /// Health check response.
    Pong,

    /// Version handshake response.
    Hello { version: String },

    /// A step was dispatched in response to `Poll`.
    Dispatch(Box<DispatchedStep>),

    /// No work was available before the long-poll timeout elapsed.
    NoWork,

    /// Reply to a run executor's `Dispatch` request once the worker
    /// that picked the step up has reported its outcome.
    Dispatched(Box<StepResult>),

    /// No registered poller's labels were a superset of the dispatch
    /// selector before the caller's `timeout_secs` elapsed.
    NoMatch,

    /// `GetWorkers` result.
    Workers { workers: Vec<WorkerSummary> },

    /// The coordinator is shutting down; the caller should reconnect
    /// elsewhere or back off.
    ShuttingDown,

    /// Request failed.
    Error { message: String },
}
