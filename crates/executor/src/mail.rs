// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stub mail executor, registered under the `"mail"` executor type.
//! SMTP delivery is out of scope for this crate.
//! The stub exists so DAGs declaring `executor_config.type = "mail"`
//! validate and run (logging the message instead of sending it) rather
//! than failing with an unregistered-executor error.

use crate::error::ExecutorError;
use crate::executor::{ExecContext, ExecOutcome, Executor, ExecutorCapabilities};
use async_trait::async_trait;

pub struct MailExecutor;

impl MailExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MailExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for MailExecutor {
    fn capabilities(&self) -> ExecutorCapabilities {
        ExecutorCapabilities { supports_cancel: false, supports_timeout: false }
    }

    async fn run(&self, ctx: ExecContext) -> Result<ExecOutcome, ExecutorError> {
        tracing::info!(body = %ctx.command, "mail executor stub: logging instead of sending");
        Ok(ExecOutcome { exit_code: Some(0), ..Default::default() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn mail_stub_always_succeeds() {
        let dir = tempdir().unwrap();
        let executor = MailExecutor::new();
        let ctx = ExecContext {
            command: "subject: test".to_string(),
            cwd: dir.path().to_path_buf(),
            env: HashMap::new(),
            stdout_path: dir.path().join("out"),
            stderr_path: dir.path().join("err"),
            timeout: None,
            cancel: CancellationToken::new(),
            sub_dag: None,
        };
        let outcome = executor.run(ctx).await.unwrap();
        assert!(outcome.succeeded());
    }
}
