// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dagctl_core::ErrorKind;
use thiserror::Error;

/// Errors raised while driving one DAG run to a terminal status.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("store error: {0}")]
    Store(#[from] dagctl_store::StoreError),
    #[error("executor error: {0}")]
    Executor(#[from] dagctl_executor::ExecutorError),
    #[error("step {step:?} declares a worker_selector but no remote dispatcher is configured for this run executor")]
    DispatchUnavailable { step: String },
    #[error("dispatch failed: {0}")]
    Dispatch(String),
    #[error("unknown sub-DAG {sub_dag:?} referenced by step {step:?}")]
    UnknownSubDag { step: String, sub_dag: String },
    #[error("step {0:?} not found")]
    UnknownStep(String),
    #[error("step {step:?} dispatches to a worker but sub-DAG {sub_dag:?} contains HITL step {hitl_step:?}")]
    HitlDispatch { step: String, sub_dag: String, hitl_step: String },
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Store(e) => e.kind(),
            RunError::Executor(_) => ErrorKind::Executor,
            RunError::DispatchUnavailable { .. }
            | RunError::UnknownSubDag { .. }
            | RunError::UnknownStep(_)
            | RunError::HitlDispatch { .. } => ErrorKind::Config,
            RunError::Dispatch(_) => ErrorKind::Dispatch,
        }
    }
}
