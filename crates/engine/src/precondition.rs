// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Precondition evaluation. A precondition with no `expected`
//! gates on exit code zero; one with `expected` gates on the command's
//! last non-empty stdout line matching verbatim.

use dagctl_core::Precondition;
use dagctl_executor::{ExecContext, ExecutorError, ExecutorRegistry, DEFAULT_EXECUTOR};
use std::collections::HashMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn evaluate(
    pre: &Precondition,
    registry: &ExecutorRegistry,
    cwd: &Path,
    env: &HashMap<String, String>,
    stdout_path: &Path,
    stderr_path: &Path,
) -> Result<bool, ExecutorError> {
    let executor = registry.get(DEFAULT_EXECUTOR)?;
    let ctx = ExecContext {
        command: pre.condition.clone(),
        cwd: cwd.to_path_buf(),
        env: env.clone(),
        stdout_path: stdout_path.to_path_buf(),
        stderr_path: stderr_path.to_path_buf(),
        timeout: None,
        cancel: CancellationToken::new(),
        sub_dag: None,
    };
    let outcome = executor.run(ctx).await?;

    match &pre.expected {
        None => Ok(outcome.succeeded()),
        Some(expected) => {
            let last_line = dagctl_executor::read_last_line(stdout_path).await;
            Ok(last_line.as_deref() == Some(expected.as_str()))
        }
    }
}

/// `all()` over a step/DAG's preconditions; an empty list is vacuously
/// true.
pub async fn all_true(
    preconditions: &[Precondition],
    registry: &ExecutorRegistry,
    cwd: &Path,
    env: &HashMap<String, String>,
    stdout_path: &Path,
    stderr_path: &Path,
) -> Result<bool, ExecutorError> {
    for pre in preconditions {
        if !evaluate(pre, registry, cwd, env, stdout_path, stderr_path).await? {
            return Ok(false);
        }
    }
    Ok(true)
}
