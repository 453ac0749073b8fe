// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dagctl_core::ErrorKind;
use thiserror::Error;

/// Errors raised by the filesystem-backed run-status store, process
/// registry, and queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed record at {path}:{line}: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("{dag_run_id} is already registered as running for DAG {dag_name:?}")]
    AlreadyRunning { dag_name: String, dag_run_id: String },
    #[error("no attempt found for {dag_name:?}/{dag_run_id}")]
    AttemptNotFound { dag_name: String, dag_run_id: String },
    #[error("queue item {0:?} not found")]
    QueueItemNotFound(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io { .. } | StoreError::Corrupt { .. } => ErrorKind::Storage,
            StoreError::AlreadyRunning { .. } => ErrorKind::Concurrency,
            StoreError::AttemptNotFound { .. } | StoreError::QueueItemNotFound(_) => ErrorKind::Storage,
        }
    }

    pub(crate) fn io(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }
}
