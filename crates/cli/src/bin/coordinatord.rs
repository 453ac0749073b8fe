// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `coordinatord` — the coordinator side of the dispatch plane (C6,
//! ): accepts worker long-polls and run-executor dispatch
//! requests on one TCP listener until SIGINT/SIGTERM.

use dagctl::config::CoordinatorEnv;
use dagctl_dispatch::Coordinator;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let env = CoordinatorEnv::load();
    let listener = TcpListener::bind(env.addr()).await?;
    let coordinator = Coordinator::new(env.poll_stale_after);

    let cancel = CancellationToken::new();
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("coordinatord received shutdown signal");
        shutdown_cancel.cancel();
    });

    tracing::info!(addr = %env.addr(), "coordinatord listening");
    coordinator.serve(listener, cancel).await;
    Ok(())
}
