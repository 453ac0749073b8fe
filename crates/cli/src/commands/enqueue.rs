// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagctl enqueue <dag-name>` — place a new run at the tail of a DAG's
//! queue; admission into `Running` is the scheduler's
//! job, not this command's.

use crate::config::Config;
use crate::exit_error::ExitError;
use dagctl_core::{Clock, DagRunId, SystemClock};
use dagctl_store::queue::{self, QueueItem};
use std::collections::HashMap;

pub struct EnqueueArgs {
    pub dag_name: String,
    pub params: HashMap<String, String>,
}

pub fn exec(args: EnqueueArgs) -> Result<DagRunId, ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(2, e.to_string()))?;
    let clock = SystemClock;
    let dag_run_id = DagRunId::new();
    let item = QueueItem {
        dag_name: args.dag_name.clone(),
        dag_run_id,
        enqueued_at_ms: clock.epoch_ms(),
        params: args.params.into_iter().collect(),
    };
    queue::enqueue(&config.data_dir, &item).map_err(|e| ExitError::new(5, e.to_string()))?;
    println!("enqueued {}/{}", args.dag_name, dag_run_id);
    Ok(dag_run_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial(data_dir_env)]
    fn enqueue_writes_a_queue_item() {
        let dir = tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path().to_str().unwrap());
        let args = EnqueueArgs { dag_name: "lin".to_string(), params: HashMap::new() };
        let run_id = exec(args).unwrap();
        let items = queue::list_by_dag_name(dir.path(), "lin").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].dag_run_id, run_id);
        std::env::remove_var("DATA_DIR");
    }
}
