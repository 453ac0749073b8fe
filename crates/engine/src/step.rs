// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry/repeat policy application and step-status determination
//!.
//!
//! Generic over the attempt closure so both command/script steps (via
//! [`dagctl_executor::Executor::run`]) and sub-DAG/parallel steps (via a
//! recursive child-run invocation) share the same retry/repeat machinery.

use dagctl_core::{DagRunRef, NodeStatus, Precondition, RepeatMode, RepeatPolicy, RetryPolicy};
use dagctl_executor::{ExecOutcome, ExecutorError, ExecutorRegistry};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// The final result of running one step through its full retry/repeat
/// lifecycle.
#[derive(Debug, Clone)]
pub struct PolicyOutcome {
    pub status: NodeStatus,
    pub exit_code: Option<i32>,
    pub output: HashMap<String, String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub done_count: u32,
    pub children: Vec<DagRunRef>,
}

/// Whether a failed attempt's exit code is eligible for retry: an empty
/// `exit_codes` list means "retry on any failure".
fn is_retryable(policy: &RetryPolicy, exit_code: Option<i32>) -> bool {
    policy.exit_codes.is_empty() || exit_code.map(|c| policy.exit_codes.contains(&c)).unwrap_or(true)
}

/// Exponential backoff: `interval_secs * 2^(attempt - 1)`, uncapped —
/// DAG authors are expected to set a sane `interval_secs` for their
/// retry budget.
fn backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
    Duration::from_secs(policy.interval_secs.saturating_mul(factor))
}

/// Run `attempt` to a terminal single-execution result, applying
/// `retry_policy` on failure. Returns `Err` only for the rare case the
/// attempt was cancelled mid-flight.
async fn run_with_retry<F, Fut>(
    retry_policy: Option<&RetryPolicy>,
    mut attempt: F,
) -> (Result<ExecOutcome, ExecutorError>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExecOutcome, ExecutorError>>,
{
    let mut tried = 0u32;
    loop {
        match attempt().await {
            Ok(outcome) if outcome.succeeded() => return (Ok(outcome), tried),
            Ok(outcome) => {
                let Some(policy) = retry_policy else { return (Ok(outcome), tried) };
                if tried >= policy.limit || !is_retryable(policy, outcome.exit_code) {
                    return (Ok(outcome), tried);
                }
                tried += 1;
                tracing::info!(attempt = tried, limit = policy.limit, "retrying failed step");
                if policy.interval_secs > 0 {
                    tokio::time::sleep(backoff(policy, tried)).await;
                }
            }
            Err(ExecutorError::Cancelled) => return (Err(ExecutorError::Cancelled), tried),
            Err(e) => {
                let Some(policy) = retry_policy else { return (Err(e), tried) };
                if tried >= policy.limit {
                    return (Err(e), tried);
                }
                tried += 1;
                tracing::warn!(attempt = tried, error = %e, "retrying step after executor error");
                if policy.interval_secs > 0 {
                    tokio::time::sleep(backoff(policy, tried)).await;
                }
            }
        }
    }
}

/// Whether a successful attempt should be repeated, per `repeat_policy`'s
/// mode and gate (`exit_code` match and/or a shell `condition`).
async fn should_repeat(
    policy: &RepeatPolicy,
    outcome: &ExecOutcome,
    registry: &ExecutorRegistry,
    cwd: &Path,
    env: &HashMap<String, String>,
    scratch_stdout: &Path,
    scratch_stderr: &Path,
) -> Result<bool, ExecutorError> {
    let exit_matches = policy.exit_code.map(|want| outcome.exit_code == Some(want));
    let condition_matches = match &policy.condition {
        Some(condition) => {
            let pre = Precondition { condition: condition.clone(), expected: None };
            Some(crate::precondition::evaluate(&pre, registry, cwd, env, scratch_stdout, scratch_stderr).await?)
        }
        None => None,
    };

    // At least one gate must be configured; an ungated policy never repeats.
    let gate_true = match (exit_matches, condition_matches) {
        (None, None) => false,
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (Some(a), Some(b)) => a || b,
    };

    Ok(match policy.mode {
        RepeatMode::While => gate_true,
        RepeatMode::Until => !gate_true,
    })
}

/// Run `attempt` through retry then repeat policy, returning the final
/// [`PolicyOutcome`]. `attempt` is called once per retry attempt and once
/// per repeat iteration.
#[allow(clippy::too_many_arguments)]
pub async fn execute<F, Fut>(
    retry_policy: Option<&RetryPolicy>,
    repeat_policy: Option<&RepeatPolicy>,
    registry: &ExecutorRegistry,
    cwd: &Path,
    env: &HashMap<String, String>,
    scratch_stdout: &Path,
    scratch_stderr: &Path,
    mut attempt: F,
) -> PolicyOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExecOutcome, ExecutorError>>,
{
    let mut done_count = 0u32;

    let (mut result, used) = run_with_retry(retry_policy, &mut attempt).await;
    let mut retry_count = used;
    done_count += 1;

    if let (Ok(outcome), Some(policy)) = (&result, repeat_policy) {
        if outcome.succeeded() {
            let mut repeats = 0u32;
            let mut current = outcome.clone();
            loop {
                if repeats >= policy.limit {
                    break;
                }
                let repeat = match should_repeat(policy, &current, registry, cwd, env, scratch_stdout, scratch_stderr).await {
                    Ok(r) => r,
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                };
                if !repeat {
                    break;
                }
                if policy.interval_secs > 0 {
                    tokio::time::sleep(Duration::from_secs(policy.interval_secs)).await;
                }
                let (next, used) = run_with_retry(retry_policy, &mut attempt).await;
                done_count += 1;
                repeats += 1;
                retry_count += used;
                match next {
                    Ok(o) => {
                        let succeeded = o.succeeded();
                        current = o.clone();
                        result = Ok(o);
                        if !succeeded {
                            break;
                        }
                    }
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }
        }
    }

    match result {
        Ok(outcome) => {
            let status = outcome
                .node_status
                .unwrap_or(if outcome.succeeded() { NodeStatus::Succeeded } else { NodeStatus::Failed });
            PolicyOutcome {
                error: if status == NodeStatus::Failed {
                    Some(format!("exit code {:?}", outcome.exit_code))
                } else {
                    None
                },
                exit_code: outcome.exit_code,
                output: outcome.output,
                children: outcome.children,
                status,
                retry_count,
                done_count,
            }
        }
        Err(ExecutorError::Cancelled) => PolicyOutcome {
            status: NodeStatus::Cancelled,
            exit_code: None,
            output: HashMap::new(),
            error: Some("cancelled".to_string()),
            retry_count,
            done_count,
            children: Vec::new(),
        },
        Err(e) => PolicyOutcome {
            status: NodeStatus::Failed,
            exit_code: None,
            output: HashMap::new(),
            error: Some(e.to_string()),
            retry_count,
            done_count,
            children: Vec::new(),
        },
    }
}
