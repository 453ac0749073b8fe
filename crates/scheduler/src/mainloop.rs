// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The global scheduler's main loop: one tick every
//! `sched_tick` drives leader election, cron firing, admission and, at
//! their own slower cadences, zombie reaping and retention GC. Only the
//! current leader fires cron schedules and admits queued runs — a
//! non-leader still reaps zombies and sweeps retention locally-idempotent
//! operations that are safe for every instance to perform, but there is
//! no harm in restricting them to the leader too, so this loop does.

use crate::admission;
use crate::cronfire::CronFire;
use crate::dagset::DagSet;
use crate::error::SchedulerError;
use crate::leader::Leadership;
use crate::retention;
use crate::zombie;
use dagctl_core::Clock;
use dagctl_engine::context::RunContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables for the main loop, all of which have env-var
/// equivalents resolved by the binary that constructs this config.
pub struct SchedulerConfig {
    pub sched_tick: Duration,
    pub lock_stale_after: Duration,
    pub lock_retry_interval: Duration,
    pub zombie_interval: Duration,
    pub zombie_ttl: Duration,
    pub zombie_requeue: bool,
    pub retention_interval: Duration,
    pub service_gc_after: Duration,
    pub host: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sched_tick: Duration::from_secs(10),
            lock_stale_after: Duration::from_secs(30),
            lock_retry_interval: Duration::from_secs(5),
            zombie_interval: Duration::from_secs(45),
            zombie_ttl: Duration::from_secs(90),
            zombie_requeue: false,
            retention_interval: Duration::from_secs(60 * 60),
            service_gc_after: Duration::from_secs(7 * 24 * 60 * 60),
            host: "localhost".to_string(),
        }
    }
}

/// Runs the main loop until `cancel` is triggered, releasing the leader
/// lock (if held) on the way out.
pub async fn run<C: Clock + Send + Sync + 'static>(
    data_dir: PathBuf,
    dags: Arc<DagSet>,
    ctx: Arc<RunContext<C>>,
    clock: C,
    config: SchedulerConfig,
    cancel: CancellationToken,
) -> Result<(), SchedulerError> {
    let mut leadership = Leadership::new(config.host.clone(), config.lock_stale_after, config.lock_retry_interval);
    let mut cronfire = CronFire::new();
    let mut last_zombie_sweep_ms = 0u64;
    let mut last_retention_sweep_ms = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Err(e) = dags.reload() {
            tracing::warn!(error = %e, "failed to reload dag directory, continuing with last-known set");
        }

        let is_leader = leadership.tick(&data_dir, &clock)?;
        if is_leader {
            match cronfire.tick(&data_dir, &dags, &clock) {
                Ok(fired) if fired > 0 => tracing::info!(fired, "cron tick fired runs"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "cron tick failed"),
            }

            match admission::admit_ready(&data_dir, &dags, &ctx, &cancel).await {
                Ok(admitted) if admitted > 0 => tracing::info!(admitted, "admission tick admitted runs"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "admission tick failed"),
            }

            let now_ms = clock.epoch_ms();
            if now_ms.saturating_sub(last_zombie_sweep_ms) >= config.zombie_interval.as_millis() as u64 {
                match zombie::reap(&data_dir, config.zombie_ttl, &clock, config.zombie_requeue) {
                    Ok(reaped) if reaped > 0 => tracing::warn!(reaped, "zombie sweep reaped stale runs"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "zombie sweep failed"),
                }
                last_zombie_sweep_ms = now_ms;
            }

            if now_ms.saturating_sub(last_retention_sweep_ms) >= config.retention_interval.as_millis() as u64 {
                match retention::sweep(&data_dir, &dags, &clock, config.service_gc_after) {
                    Ok(removed) if removed > 0 => tracing::info!(removed, "retention sweep removed expired records"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "retention sweep failed"),
                }
                last_retention_sweep_ms = now_ms;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.sched_tick) => {}
            _ = cancel.cancelled() => break,
        }
    }

    leadership.release(&data_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::{DagRunId, FakeClock};
    use dagctl_executor::ExecutorRegistry;
    use dagctl_store::queue;
    use tempfile::tempdir;

    #[tokio::test]
    async fn leader_fires_cron_and_admits_in_one_tick() {
        let dir = tempdir().unwrap();
        let dags_dir = dir.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        std::fs::write(
            dags_dir.join("always.yaml"),
            b"name: always\nschedule: [\"* * * * *\"]\nmax_active_runs: 5\nsteps:\n  - name: a\n    command: echo hi\n",
        )
        .unwrap();

        let dags = Arc::new(DagSet::new(dags_dir));
        dags.reload().unwrap();

        let clock = FakeClock::new();
        let ctx = Arc::new(RunContext::new(dir.path().to_path_buf(), ExecutorRegistry::with_builtins(), clock.clone(), dags.clone()));
        let cancel = CancellationToken::new();

        let mut leadership = Leadership::new("host-a", Duration::from_secs(30), Duration::from_secs(5));
        assert!(leadership.tick(dir.path(), &clock).unwrap());

        let mut cronfire = CronFire::new();
        let fired = cronfire.tick(dir.path(), &dags, &clock).unwrap();
        assert_eq!(fired, 1);

        let admitted = admission::admit_ready(dir.path(), &dags, &ctx, &cancel).await.unwrap();
        assert_eq!(admitted, 1);
        assert!(queue::list_by_dag_name(dir.path(), "always").unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_leader_does_not_fire_or_admit() {
        let dir = tempdir().unwrap();
        let dags_dir = dir.path().join("dags");
        std::fs::create_dir_all(&dags_dir).unwrap();
        let dags = Arc::new(DagSet::new(dags_dir));
        dags.reload().unwrap();
        let clock = FakeClock::new();

        let mut holder = Leadership::new("host-a", Duration::from_secs(30), Duration::from_secs(5));
        assert!(holder.tick(dir.path(), &clock).unwrap());

        let mut challenger = Leadership::new("host-b", Duration::from_secs(30), Duration::from_secs(5));
        assert!(!challenger.tick(dir.path(), &clock).unwrap());

        queue::enqueue(
            dir.path(),
            &queue::QueueItem { dag_name: "ghost".to_string(), dag_run_id: DagRunId::new(), enqueued_at_ms: 0, params: Default::default() },
        )
        .unwrap();
        assert_eq!(queue::list_by_dag_name(dir.path(), "ghost").unwrap().len(), 1);
    }
}
