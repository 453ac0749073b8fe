// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagctl status <dag-name> [run-id]` — read the run-status store (C2)
//! without touching any running process: with a run id, show that
//! run's latest attempt; without one, list every run recorded for the
//! DAG, most recently started first.

use crate::config::Config;
use crate::exit_error::ExitError;
use crate::output::{format_or_json, handle_list, OutputFormat};
use dagctl_core::DagRunId;
use dagctl_store::runstatus;

pub struct StatusArgs {
    pub dag_name: String,
    pub dag_run_id: Option<DagRunId>,
    pub format: OutputFormat,
}

pub fn exec(args: StatusArgs) -> Result<(), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(2, e.to_string()))?;

    match args.dag_run_id {
        Some(run_id) => {
            let found = runstatus::latest_attempt(&config.data_dir, &args.dag_name, &run_id)
                .map_err(|e| ExitError::new(5, e.to_string()))?;
            let Some((attempt, status)) = found else {
                return Err(ExitError::new(3, format!("no recorded run {}/{run_id}", args.dag_name)));
            };
            format_or_json(args.format, &status, || {
                println!("run {} attempt {attempt}: {}", status.ref_, status.status);
                for node in &status.nodes {
                    println!("  {:<20} {}", node.step_name, node.status);
                }
            })
            .map_err(|e| ExitError::new(1, e.to_string()))
        }
        None => {
            let statuses = runstatus::list_statuses(&config.data_dir, &args.dag_name)
                .map_err(|e| ExitError::new(5, e.to_string()))?;
            handle_list(args.format, &statuses, "no runs recorded", |items| {
                for status in items {
                    println!("{:<40} {:<20} attempt {}", status.ref_, status.status, status.attempt);
                }
            })
            .map_err(|e| ExitError::new(1, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::{DagRunRef, DagRunStatus};
    use serial_test::serial;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    #[serial(data_dir_env)]
    fn missing_run_is_not_found() {
        let dir = tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path().to_str().unwrap());
        let args = StatusArgs { dag_name: "nope".to_string(), dag_run_id: Some(DagRunId::new()), format: OutputFormat::Text };
        let err = exec(args).unwrap_err();
        assert_eq!(err.code, 3);
        std::env::remove_var("DATA_DIR");
    }

    #[test]
    #[serial(data_dir_env)]
    fn reads_back_an_appended_status() {
        let dir = tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path().to_str().unwrap());
        let dag_run_ref = DagRunRef::new("lin", DagRunId::new());
        let mut handle = runstatus::open_attempt(
            dir.path(),
            "lin",
            &dag_run_ref.dag_run_id,
            dagctl_core::AttemptOrdinal::FIRST,
            1_700_000_000_000,
        )
        .unwrap();
        let status = DagRunStatus::new_queued(dag_run_ref.clone(), BTreeMap::new());
        runstatus::append(&mut handle, &status).unwrap();

        let args = StatusArgs { dag_name: "lin".to_string(), dag_run_id: Some(dag_run_ref.dag_run_id), format: OutputFormat::Text };
        assert!(exec(args).is_ok());
        std::env::remove_var("DATA_DIR");
    }
}
