// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Filesystem-backed persistence for the orchestrator: the run-status
//! store (C2), the process registry (C3), the queue store (C4), the
//! scheduler leader lock (C7.a), and the service registry (C7.b)
//!.
//!
//! Every subsystem here uses the filesystem itself as the coordination
//! primitive — `O_APPEND`+`fsync`, `O_CREAT|O_EXCL`, rename-into-place,
//! and mtime — rather than an embedded database, so a `DATA_DIR` can be
//! inspected and repaired with ordinary Unix tools.
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod error;
pub mod leaderlock;
pub mod procreg;
pub mod queue;
pub mod runstatus;
pub mod svcreg;

pub use error::StoreError;
pub use leaderlock::{AcquireOutcome, LockRecord};
pub use svcreg::{MemberStatus, MemberView, ServiceMember};
