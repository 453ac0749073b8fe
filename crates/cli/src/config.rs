// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable configuration, loaded once by each
//! daemon binary's `main()`. There is no YAML config file for the
//! daemons themselves — only DAG documents are parsed from YAML; the
//! process topology and timings here are env-only: `Config::load()`
//! reads `std::env::var` with defaults and validates paths.

use std::path::PathBuf;
use std::time::Duration;

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

/// Shared configuration every binary (`dagctl`, `schedulerd`,
/// `coordinatord`, `workerd`) loads before touching the filesystem
/// stores. `DATA_DIR` is the one variable every binary needs; the rest
/// are only consulted by the daemon that cares about them.
pub struct Config {
    pub data_dir: PathBuf,
    pub dags_dir: PathBuf,
}

impl Config {
    /// Load from environment, applying defaults. Does not
    /// create `data_dir` — callers that write to it are responsible for
    /// `create_dir_all`, matching the "validates paths exist/are
    /// creatable" ambient-stack note rather than silently mkdir-ing
    /// config the process didn't ask for.
    pub fn load() -> anyhow::Result<Self> {
        let data_dir = PathBuf::from(env_string("DATA_DIR", "./data"));
        let dags_dir = std::env::var("DAGS_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("dags"));
        Ok(Self { data_dir, dags_dir })
    }
}

/// Scheduler-specific timings.
pub struct SchedulerEnv {
    pub tick: Duration,
    pub lock_stale_after: Duration,
    pub lock_retry_interval: Duration,
    pub zombie_interval: Duration,
    pub zombie_ttl: Duration,
    pub zombie_requeue: bool,
    pub retention_interval: Duration,
    pub service_gc_after: Duration,
    pub host: String,
}

impl SchedulerEnv {
    pub fn load() -> Self {
        Self {
            tick: env_duration_secs("SCHEDULER_TICK_INTERVAL", 10),
            lock_stale_after: env_duration_secs("SCHEDULER_LOCK_STALE_THRESHOLD", 30),
            lock_retry_interval: env_duration_secs("SCHEDULER_LOCK_RETRY_INTERVAL", 5),
            zombie_interval: env_duration_secs("SCHEDULER_ZOMBIE_DETECTION_INTERVAL", 45),
            zombie_ttl: env_duration_secs("SCHEDULER_ZOMBIE_TTL", 90),
            zombie_requeue: std::env::var("SCHEDULER_ZOMBIE_REQUEUE").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
            retention_interval: env_duration_secs("SCHEDULER_RETENTION_INTERVAL", 60 * 60),
            service_gc_after: env_duration_secs("SCHEDULER_SERVICE_GC_AFTER", 7 * 24 * 60 * 60),
            host: env_string("HOSTNAME", "localhost"),
        }
    }
}

/// Coordinator topology.
pub struct CoordinatorEnv {
    pub host: String,
    pub port: u16,
    pub poll_stale_after: Duration,
}

impl CoordinatorEnv {
    pub fn load() -> Self {
        Self {
            host: env_string("COORDINATOR_HOST", "127.0.0.1"),
            port: std::env::var("COORDINATOR_PORT").ok().and_then(|v| v.parse().ok()).unwrap_or(7080),
            poll_stale_after: env_duration_secs("COORDINATOR_POLL_STALE_AFTER", 15),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Worker topology.
pub struct WorkerEnv {
    pub coordinator_addr: String,
    pub labels: std::collections::BTreeSet<String>,
    pub poller_count: usize,
    pub long_poll_secs: u64,
    pub heartbeat_interval: Duration,
}

impl WorkerEnv {
    pub fn load() -> Self {
        let coordinator_addr = env_string("COORDINATOR_ADDR", "127.0.0.1:7080");
        let labels = std::env::var("WORKER_LABELS")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let poller_count =
            std::env::var("WORKER_MAX_ACTIVE_RUNS").ok().and_then(|v| v.parse().ok()).unwrap_or(4usize);
        Self {
            coordinator_addr,
            labels,
            poller_count,
            long_poll_secs: std::env::var("WORKER_LONG_POLL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(60),
            heartbeat_interval: env_duration_secs("WORKER_HEARTBEAT_INTERVAL", 5),
        }
    }
}
