// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `workerd` — a long-polling worker: `WORKER_MAX_ACTIVE_RUNS` concurrent pollers against one
//! coordinator, each executing whatever step it's handed through the
//! same run-executor path a local run would use.

use dagctl::config::Config;
use dagctl::config::WorkerEnv;
use dagctl_core::SystemClock;
use dagctl_dispatch::Worker;
use dagctl_engine::context::RunContext;
use dagctl_executor::ExecutorRegistry;
use dagctl_scheduler::DagSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = Config::load()?;
    let env = WorkerEnv::load();
    std::fs::create_dir_all(&config.data_dir)?;

    let dags = Arc::new(DagSet::new(config.dags_dir.clone()));
    dags.reload()?;

    let clock = SystemClock;
    let registry = ExecutorRegistry::with_builtins();
    let ctx = Arc::new(RunContext::new(config.data_dir.clone(), registry, clock, dags));

    let worker = Worker::new(
        env.coordinator_addr.clone(),
        env.labels.clone(),
        env.poller_count,
        env.long_poll_secs,
        env.heartbeat_interval,
        config.data_dir.clone(),
        ctx,
    );

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("workerd received shutdown signal");
        shutdown_cancel.cancel();
    });

    tracing::info!(worker_id = %worker.worker_id(), coordinator = %env.coordinator_addr, labels = ?env.labels, "workerd starting");
    worker.serve(cancel).await;
    Ok(())
}
