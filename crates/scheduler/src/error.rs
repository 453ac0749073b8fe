// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dagctl_core::ErrorKind;
use thiserror::Error;

/// Errors raised by the global scheduler (C7, ).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("store error: {0}")]
    Store(#[from] dagctl_store::StoreError),
    #[error("run error: {0}")]
    Run(#[from] dagctl_engine::error::RunError),
    #[error("dag parse error in {path:?}: {source}")]
    DagParse { path: std::path::PathBuf, source: dagctl_spec::ParseError },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cron error: {0}")]
    Cron(#[from] dagctl_spec::CronError),
}

impl SchedulerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchedulerError::Store(e) => e.kind(),
            SchedulerError::Run(e) => e.kind(),
            SchedulerError::DagParse { .. } | SchedulerError::Cron(_) => ErrorKind::Config,
            SchedulerError::Io(_) => ErrorKind::Storage,
        }
    }
}
