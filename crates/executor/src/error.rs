// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dagctl_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("spawn failed: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("step timed out after {0:?}")]
    TimedOut(std::time::Duration),
    #[error("step was cancelled")]
    Cancelled,
    #[error("unregistered executor type {0:?}")]
    Unregistered(String),
    #[error("{0}")]
    Other(String),
}

impl ExecutorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutorError::Cancelled => ErrorKind::Lifecycle,
            ExecutorError::Unregistered(_) => ErrorKind::Config,
            _ => ErrorKind::Executor,
        }
    }
}
