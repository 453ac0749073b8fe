// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The default executor: runs a step's command line under `bash -c`,
//! with stdout/stderr teed to per-step log files.
//!
//! On cancellation or timeout the child is sent `SIGTERM`; if it has not
//! exited within [`GRACE_PERIOD`] it is sent `SIGKILL`.

use crate::error::ExecutorError;
use crate::executor::{ExecContext, ExecOutcome, Executor, ExecutorCapabilities};
use async_trait::async_trait;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio::process::Command;

const GRACE_PERIOD: Duration = Duration::from_secs(10);

pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for CommandExecutor {
    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities { supports_cancel: true, supports_timeout: true }
    }

    async fn run(&self, ctx: ExecContext) -> Result<ExecOutcome, ExecutorError> {
        if let Some(parent) = ctx.stdout_path.parent() {
            std::fs::create_dir_all(parent).map_err(ExecutorError::Spawn)?;
        }
        let stdout_file = File::create(&ctx.stdout_path).map_err(ExecutorError::Spawn)?;
        let stderr_file = File::create(&ctx.stderr_path).map_err(ExecutorError::Spawn)?;

        tracing::info!(command = %ctx.command, cwd = %ctx.cwd.display(), "running step command");

        let wrapped = format!("set -euo pipefail\n{}", ctx.command);
        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(&wrapped)
            .current_dir(&ctx.cwd)
            .envs(&ctx.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));

        let start = std::time::Instant::now();
        let mut child = cmd.spawn().map_err(ExecutorError::Spawn)?;
        let pid = child.id();

        let wait_result = match ctx.timeout {
            Some(timeout) => {
                tokio::select! {
                    result = child.wait() => WaitOutcome::Exited(result),
                    _ = tokio::time::sleep(timeout) => WaitOutcome::TimedOut,
                    _ = ctx.cancel.cancelled() => WaitOutcome::Cancelled,
                }
            }
            None => {
                tokio::select! {
                    result = child.wait() => WaitOutcome::Exited(result),
                    _ = ctx.cancel.cancelled() => WaitOutcome::Cancelled,
                }
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;

        match wait_result {
            WaitOutcome::Exited(result) => {
                let status = result.map_err(ExecutorError::Spawn)?;
                tracing::info!(elapsed_ms, exit_code = status.code(), "step command exited");
                Ok(ExecOutcome { exit_code: status.code(), ..Default::default() })
            }
            WaitOutcome::TimedOut => {
                terminate(pid, &mut child).await;
                tracing::error!(elapsed_ms, "step command timed out");
                Err(ExecutorError::TimedOut(ctx.timeout.unwrap_or_default()))
            }
            WaitOutcome::Cancelled => {
                terminate(pid, &mut child).await;
                tracing::warn!(elapsed_ms, "step command cancelled");
                Err(ExecutorError::Cancelled)
            }
        }
    }
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

/// `SIGTERM`, then `SIGKILL` only if the child is still alive after
/// [`GRACE_PERIOD`] — never sleeps the full grace period once the child
/// has already exited.
async fn terminate(pid: Option<u32>, child: &mut tokio::process::Child) {
    let Some(pid) = pid else { return };
    let nix_pid = Pid::from_raw(pid as i32);
    let _ = signal::kill(nix_pid, Signal::SIGTERM);
    tokio::select! {
        _ = child.wait() => {}
        _ = tokio::time::sleep(GRACE_PERIOD) => {
            let _ = signal::kill(nix_pid, Signal::SIGKILL);
            let _ = child.wait().await;
        }
    }
}

/// Read a step's captured stdout/stderr back for `output` variable
/// extraction (the last non-empty line, per convention).
pub async fn read_last_line(path: &std::path::Path) -> Option<String> {
    let file = tokio::fs::File::open(path).await.ok()?;
    let mut contents = String::new();
    BufReader::new(file).read_to_string(&mut contents).await.ok()?;
    contents.lines().rev().find(|l| !l.trim().is_empty()).map(|l| l.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &std::path::Path, command: &str, timeout: Option<Duration>) -> ExecContext {
        ExecContext {
            command: command.to_string(),
            cwd: dir.to_path_buf(),
            env: HashMap::new(),
            stdout_path: dir.join("stdout.log"),
            stderr_path: dir.join("stderr.log"),
            timeout,
            cancel: CancellationToken::new(),
            sub_dag: None,
        }
    }

    #[tokio::test]
    async fn successful_command_reports_zero_exit() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new();
        let outcome = executor.run(ctx(dir.path(), "exit 0", None)).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.succeeded());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_errored() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new();
        let outcome = executor.run(ctx(dir.path(), "exit 7", None)).await.unwrap();
        assert_eq!(outcome.exit_code, Some(7));
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn stdout_is_captured_to_file() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new();
        let c = ctx(dir.path(), "echo hello-world", None);
        let stdout_path = c.stdout_path.clone();
        executor.run(c).await.unwrap();
        let contents = std::fs::read_to_string(&stdout_path).unwrap();
        assert_eq!(contents.trim(), "hello-world");
    }

    #[tokio::test]
    async fn cancellation_terminates_long_running_command() {
        let dir = tempdir().unwrap();
        let executor = CommandExecutor::new();
        let mut c = ctx(dir.path(), "sleep 30", None);
        let token = CancellationToken::new();
        c.cancel = token.clone();
        token.cancel();
        let result = executor.run(c).await;
        assert!(matches!(result, Err(ExecutorError::Cancelled)));
    }
}
