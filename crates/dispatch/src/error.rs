// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dagctl_core::ErrorKind;
use thiserror::Error;

/// Errors raised by the coordinator/worker dispatch plane.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("wire protocol error: {0}")]
    Protocol(#[from] dagctl_wire::ProtocolError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] dagctl_store::StoreError),
    #[error("no worker matched selector before the dispatch timeout elapsed")]
    NoMatch,
    #[error("coordinator returned an error: {0}")]
    Remote(String),
    #[error("coordinator connection closed before a result was reported")]
    ConnectionLost,
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Protocol(_) | DispatchError::Io(_) | DispatchError::ConnectionLost => ErrorKind::Dispatch,
            DispatchError::Store(e) => e.kind(),
            DispatchError::NoMatch | DispatchError::Remote(_) => ErrorKind::Dispatch,
        }
    }
}
