// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagctl run <dag.yaml>` — parse a DAG document, validate it, and run
//! it to a terminal status in this process (no scheduler/queue
//! involved), the same path the scheduler itself uses once it admits a
//! run, just driven directly for local testing and one-off execution.

use crate::config::Config;
use crate::exit_error::ExitError;
use crate::output::{format_or_json, OutputFormat};
use dagctl_core::{Clock, DagRunId, DagRunRef, SystemClock};
use dagctl_engine::context::RunContext;
use dagctl_executor::ExecutorRegistry;
use dagctl_scheduler::DagSet;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct RunArgs {
    pub dag_path: PathBuf,
    pub params: HashMap<String, String>,
    pub format: OutputFormat,
}

pub async fn exec(args: RunArgs) -> Result<(), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(2, e.to_string()))?;

    let bytes = std::fs::read(&args.dag_path)
        .map_err(|e| ExitError::new(4, format!("reading {}: {e}", args.dag_path.display())))?;
    let dag = dagctl_spec::parse(&bytes).map_err(|e| ExitError::new(2, e.to_string()))?;
    dagctl_spec::validate(&dag).map_err(|e| ExitError::new(2, e.to_string()))?;

    let dags_dir = args.dag_path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from("."));
    let dag_set = Arc::new(DagSet::new(dags_dir));
    dag_set.reload().map_err(|e| ExitError::new(2, e.to_string()))?;

    let registry = ExecutorRegistry::with_builtins();
    let clock = SystemClock;
    let ctx = Arc::new(RunContext::new(config.data_dir.clone(), registry, clock, dag_set));

    let dag_run_ref = DagRunRef::new(dag.name.clone(), DagRunId::new());
    let root_ref = dag_run_ref.clone();
    let cancel = CancellationToken::new();

    let status = dagctl_engine::run::run(ctx, dag, dag_run_ref, args.params, None, root_ref, cancel)
        .await
        .map_err(|e| ExitError::new(1, e.to_string()))?;

    format_or_json(args.format, &status, || {
        println!("run {} finished: {}", status.ref_, status.status);
        for node in &status.nodes {
            println!("  {:<20} {}", node.step_name, node.status);
        }
    })
    .map_err(|e| ExitError::new(1, e.to_string()))?;

    if matches!(status.status, dagctl_core::DagRunStatusKind::Failed | dagctl_core::DagRunStatusKind::Cancelled) {
        return Err(ExitError::new(1, format!("run ended in {}", status.status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[tokio::test]
    #[serial(data_dir_env)]
    async fn linear_dag_runs_to_succeeded() {
        let dir = tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path().join("data").to_str().unwrap());
        let dag_path = dir.path().join("lin.yaml");
        std::fs::write(
            &dag_path,
            b"name: lin\nsteps:\n  - name: a\n    command: \"true\"\n  - name: b\n    command: \"true\"\n    depends: [a]\n",
        )
        .unwrap();

        let args = RunArgs { dag_path, params: HashMap::new(), format: OutputFormat::Text };
        let result = exec(args).await;
        assert!(result.is_ok(), "expected success, got {result:?}");
        std::env::remove_var("DATA_DIR");
    }
}
