// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `dagctl queue ls/rm` — inspect and, in emergencies, surgically edit
//! the queue store without going through admission.

use crate::config::Config;
use crate::exit_error::ExitError;
use crate::output::{handle_list, OutputFormat};
use dagctl_core::DagRunId;
use dagctl_store::queue;

pub struct ListArgs {
    pub dag_name: Option<String>,
    pub format: OutputFormat,
}

pub fn list(args: ListArgs) -> Result<(), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(2, e.to_string()))?;
    let items = match &args.dag_name {
        Some(name) => queue::list_by_dag_name(&config.data_dir, name),
        None => queue::all(&config.data_dir),
    }
    .map_err(|e| ExitError::new(5, e.to_string()))?;

    handle_list(args.format, &items, "queue is empty", |items| {
        for item in items {
            println!("{:<20} {:<26} enqueued_at_ms={}", item.dag_name, item.dag_run_id, item.enqueued_at_ms);
        }
    })
    .map_err(|e| ExitError::new(1, e.to_string()))
}

pub struct RemoveArgs {
    pub dag_name: String,
    pub dag_run_id: DagRunId,
    pub enqueued_at_ms: u64,
}

pub fn remove(args: RemoveArgs) -> Result<(), ExitError> {
    let config = Config::load().map_err(|e| ExitError::new(2, e.to_string()))?;
    queue::remove(&config.data_dir, &args.dag_name, &args.dag_run_id, args.enqueued_at_ms)
        .map_err(|e| ExitError::new(5, e.to_string()))?;
    println!("removed {}/{} from queue", args.dag_name, args.dag_run_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::{Clock, SystemClock};
    use dagctl_store::queue::QueueItem;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial(data_dir_env)]
    fn list_then_remove_round_trips() {
        let dir = tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path().to_str().unwrap());
        let clock = SystemClock;
        let item = QueueItem { dag_name: "lin".to_string(), dag_run_id: DagRunId::new(), enqueued_at_ms: clock.epoch_ms(), params: Default::default() };
        queue::enqueue(dir.path(), &item).unwrap();

        list(ListArgs { dag_name: Some("lin".to_string()), format: OutputFormat::Text }).unwrap();

        remove(RemoveArgs { dag_name: item.dag_name.clone(), dag_run_id: item.dag_run_id, enqueued_at_ms: item.enqueued_at_ms }).unwrap();
        let remaining = queue::list_by_dag_name(dir.path(), "lin").unwrap();
        assert!(remaining.is_empty());
        std::env::remove_var("DATA_DIR");
    }
}
