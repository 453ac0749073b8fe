// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The coordinator/worker dispatch plane (C6, ): matches a
//! `workerSelector`-bearing step dispatched by a run executor to a
//! worker process long-polling with a superset label set, correlates
//! the eventual report across their separate connections, and rolls
//! up worker liveness into a coarse health signal.
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod coordinator;
pub mod error;
pub mod health;
pub mod worker;

pub use client::CoordinatorClient;
pub use coordinator::Coordinator;
pub use error::DispatchError;
pub use health::{rollup, Health, WorkerSnapshot};
pub use worker::Worker;
