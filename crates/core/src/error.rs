// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the orchestrator.
//!
//! Every fallible subsystem defines its own `thiserror` enum, but each one
//! exposes a [`ErrorKind`] so that API/CLI adapters can render a stable code
//! and decide recoverability without matching on subsystem-specific variants.

use serde::{Deserialize, Serialize};

/// Coarse error classification used for stable error codes and recovery
/// policy, independent of which subsystem raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed DAG, invalid selector, forbidden combination.
    Config,
    /// Declared precondition evaluated false (not really an error; `Skipped`).
    Precondition,
    /// Step process nonzero exit or internal executor error.
    Executor,
    /// No matching worker / worker unreachable.
    Dispatch,
    /// Filesystem error on append/list/read.
    Storage,
    /// Concurrency cap reached; not fatal, item remains queued.
    Admission,
    /// Duplicate run id / already-running singleton.
    Concurrency,
    /// Zombie detected; synthesized terminal status.
    Lifecycle,
}

crate::simple_display! {
    ErrorKind {
        Config => "config",
        Precondition => "precondition",
        Executor => "executor",
        Dispatch => "dispatch",
        Storage => "storage",
        Admission => "admission",
        Concurrency => "concurrency",
        Lifecycle => "lifecycle",
    }
}

impl ErrorKind {
    /// Whether callers should treat this as recoverable without operator
    /// intervention.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::Precondition | ErrorKind::Admission)
    }
}
