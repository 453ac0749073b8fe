// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Carries a process exit code alongside an error message so command
//! handlers can signal a specific code without
//! calling `std::process::exit` themselves — `main()` is the only place
//! that terminates the process.

use std::fmt;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// Concurrency cap reached is not an
    /// error, but the CLI still needs a distinct code for scripts.
    pub fn max_run_reached(dag_name: &str) -> Self {
        Self::new(10, format!("dag '{dag_name}' is at its concurrency limit; run left queued"))
    }

    /// Duplicate run id / already-running
    /// singleton surfaces as a conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(11, message.into())
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}
