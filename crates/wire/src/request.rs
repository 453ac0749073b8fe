// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::types::{DispatchedStep, StepResult};
use dagctl_core::WorkerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A message sent from a worker, run executor, or CLI client to the
/// coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Version/capability handshake.
    Hello { version: String },

    /// Long-poll for work matching `labels`. The coordinator holds the
    /// connection open up to `long_poll_secs` before answering `NoWork`.
    Poll {
        worker_id: WorkerId,
        labels: BTreeSet<String>,
        long_poll_secs: u64,
    },

    /// Submit a step for dispatch to a poller whose labels are a
    /// superset of `selector`, sent by a run executor rather
    /// than a worker. The coordinator holds this connection open the
    /// same way it holds a worker's `Poll`, answering once the
    /// dispatched step completes or `timeout_secs` elapses with no
    /// matching poller.
    Dispatch {
        step: DispatchedStep,
        selector: BTreeSet<String>,
        timeout_secs: u64,
    },

    /// Report the outcome of a previously dispatched step.
    Report(StepResult),

    /// Liveness ping independent of `Poll` (keeps a worker's registration
    /// alive between long-poll cycles).
    Heartbeat { worker_id: WorkerId },

    /// List currently registered workers and their label sets.
    GetWorkers,

    /// Daemon health check.
    Ping,

    /// Request graceful shutdown.
    Shutdown,
}
