// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron firing: evaluate every loaded
//! DAG's [`dagctl_spec::cron::CronSet`] against wall clock and enqueue a
//! run the first time a due minute is observed.
//!
//! `CronSet::is_due` is itself minute-granular, but the scheduler ticks
//! every `T_sched_tick` (default 10 s) — several times a minute — so
//! firing on every `true` would enqueue the same minute repeatedly. A
//! `last_fired` mark per DAG, kept in memory for this process's
//! lifetime, is enough to fire exactly once per due minute; it resets on
//! restart, which is acceptable since a missed/duplicated cron run is no
//! different from any other at-least-once admission in this system.

use crate::dagset::DagSet;
use crate::error::SchedulerError;
use chrono::{TimeZone, Utc};
use dagctl_core::{Clock, DagRunId};
use dagctl_store::queue;
use std::collections::HashMap;
use std::path::Path;

#[derive(Default)]
pub struct CronFire {
    last_fired_minute: HashMap<String, i64>,
}

impl CronFire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every loaded DAG's schedule against `clock`'s current
    /// time and enqueue any that just crossed a due minute. Returns the
    /// number of runs enqueued.
    pub fn tick<C: Clock>(&mut self, data_dir: &Path, dags: &DagSet, clock: &C) -> Result<usize, SchedulerError> {
        let now_ms = clock.epoch_ms();
        let now = Utc.timestamp_millis_opt(now_ms as i64).single().unwrap_or_else(Utc::now);
        let minute = now_ms as i64 / 60_000;
        let mut fired = 0;

        for name in dags.names() {
            let Some(cron) = dags.cron(&name) else { continue };
            if cron.is_empty() {
                continue;
            }
            if self.last_fired_minute.get(&name) == Some(&minute) {
                continue;
            }
            if !cron.is_due(now) {
                continue;
            }

            queue::enqueue(
                data_dir,
                &queue::QueueItem { dag_name: name.clone(), dag_run_id: DagRunId::new(), enqueued_at_ms: now_ms, params: Default::default() },
            )?;
            self.last_fired_minute.insert(name.clone(), minute);
            fired += 1;
            tracing::info!(dag = %name, "cron schedule fired, enqueued run");
        }

        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::FakeClock;
    use tempfile::tempdir;

    fn write_dag(dags_dir: &Path, name: &str, schedule: &str) {
        std::fs::write(
            dags_dir.join(format!("{name}.yaml")),
            format!("name: {name}\nschedule: [\"{schedule}\"]\nsteps:\n  - name: a\n    command: echo hi\n"),
        )
        .unwrap();
    }

    #[test]
    fn due_schedule_fires_exactly_once_per_minute() {
        let dir = tempdir().unwrap();
        let dags_dir = dir.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        write_dag(&dags_dir, "always", "* * * * *");
        let dags = DagSet::new(dags_dir);
        dags.reload().unwrap();

        let clock = FakeClock::new();
        let mut cronfire = CronFire::new();

        assert_eq!(cronfire.tick(dir.path(), &dags, &clock).unwrap(), 1);
        assert_eq!(cronfire.tick(dir.path(), &dags, &clock).unwrap(), 0);

        clock.advance(std::time::Duration::from_secs(61));
        assert_eq!(cronfire.tick(dir.path(), &dags, &clock).unwrap(), 1);

        assert_eq!(queue::list_by_dag_name(dir.path(), "always").unwrap().len(), 2);
    }

    #[test]
    fn dag_without_a_schedule_never_fires() {
        let dir = tempdir().unwrap();
        let dags_dir = dir.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        std::fs::write(dags_dir.join("manual.yaml"), b"name: manual\nsteps:\n  - name: a\n    command: echo hi\n").unwrap();
        let dags = DagSet::new(dags_dir);
        dags.reload().unwrap();

        let clock = FakeClock::new();
        let mut cronfire = CronFire::new();
        assert_eq!(cronfire.tick(dir.path(), &dags, &clock).unwrap(), 0);
    }
}
