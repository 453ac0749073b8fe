// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `schedulerd` — the global scheduler daemon (C7, ): one
//! tick loop driving leader election, cron firing, admission, zombie
//! reaping and retention GC until SIGINT/SIGTERM.

use dagctl::config::{Config, SchedulerEnv};
use dagctl_core::SystemClock;
use dagctl_engine::context::RunContext;
use dagctl_executor::ExecutorRegistry;
use dagctl_scheduler::{mainloop, DagSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = Config::load()?;
    let env = SchedulerEnv::load();

    std::fs::create_dir_all(&config.data_dir)?;
    std::fs::create_dir_all(&config.dags_dir)?;

    let dags = Arc::new(DagSet::new(config.dags_dir.clone()));
    dags.reload()?;

    let clock = SystemClock;
    let registry = ExecutorRegistry::with_builtins();
    let ctx = Arc::new(RunContext::new(config.data_dir.clone(), registry, clock.clone(), dags.clone()));

    let sched_config = mainloop::SchedulerConfig {
        sched_tick: env.tick,
        lock_stale_after: env.lock_stale_after,
        lock_retry_interval: env.lock_retry_interval,
        zombie_interval: env.zombie_interval,
        zombie_ttl: env.zombie_ttl,
        zombie_requeue: env.zombie_requeue,
        retention_interval: env.retention_interval,
        service_gc_after: env.service_gc_after,
        host: env.host,
    };

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("schedulerd received shutdown signal");
        shutdown_cancel.cancel();
    });

    tracing::info!(data_dir = %config.data_dir.display(), "schedulerd starting");
    mainloop::run(config.data_dir, dags, ctx, clock, sched_config, cancel).await?;
    Ok(())
}
