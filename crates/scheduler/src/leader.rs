// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Leader election for the global scheduler, wrapping
//! [`dagctl_store::leaderlock`] with this process's identity and the
//! refresh cadence the main loop drives it at.

use crate::error::SchedulerError;
use dagctl_core::{Clock, CoordinatorId};
use dagctl_store::leaderlock::{self, AcquireOutcome};
use std::path::Path;
use std::time::Duration;

/// Tracks whether this process currently believes itself to be leader,
/// re-evaluated once per scheduler tick rather than held as a standing
/// lease — a stale belief self-corrects on the next [`Leadership::tick`]
/// since [`leaderlock::try_acquire`] is idempotent for the current holder.
pub struct Leadership {
    id: CoordinatorId,
    host: String,
    stale_after: Duration,
    retry_interval: Duration,
    is_leader: bool,
    last_refresh_ms: u64,
}

impl Leadership {
    pub fn new(host: impl Into<String>, stale_after: Duration, retry_interval: Duration) -> Self {
        Self {
            id: CoordinatorId::new(),
            host: host.into(),
            stale_after,
            retry_interval,
            is_leader: false,
            last_refresh_ms: 0,
        }
    }

    pub fn id(&self) -> CoordinatorId {
        self.id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    /// Acquire or refresh the lock as appropriate for `now`. Returns
    /// whether this process is leader after the call. A non-leader
    /// retries acquisition on every tick; a leader only re-writes the
    /// lock file every `retry_interval`, the same cadence used for
    /// refreshing `refreshed_at`.
    pub fn tick<C: Clock>(&mut self, data_dir: &Path, clock: &C) -> Result<bool, SchedulerError> {
        let now_ms = clock.epoch_ms();

        if self.is_leader {
            if now_ms.saturating_sub(self.last_refresh_ms) >= self.retry_interval.as_millis() as u64 {
                let still_leader = leaderlock::refresh(data_dir, &self.id, now_ms)?;
                self.is_leader = still_leader;
                self.last_refresh_ms = now_ms;
            }
            return Ok(self.is_leader);
        }

        let outcome = leaderlock::try_acquire(data_dir, self.id, &self.host, now_ms, self.stale_after)?;
        self.is_leader = outcome == AcquireOutcome::Acquired;
        self.last_refresh_ms = now_ms;
        Ok(self.is_leader)
    }

    /// Release the lock on graceful shutdown, if still held.
    pub fn release(&mut self, data_dir: &Path) -> Result<(), SchedulerError> {
        if self.is_leader {
            leaderlock::release(data_dir, &self.id)?;
            self.is_leader = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagctl_core::FakeClock;
    use tempfile::tempdir;

    #[test]
    fn first_tick_acquires_leadership() {
        let dir = tempdir().unwrap();
        let clock = FakeClock::new();
        let mut leadership = Leadership::new("host-a", Duration::from_secs(30), Duration::from_secs(5));
        assert!(leadership.tick(dir.path(), &clock).unwrap());
    }

    #[test]
    fn second_instance_does_not_steal_fresh_lock() {
        let dir = tempdir().unwrap();
        let clock = FakeClock::new();
        let mut a = Leadership::new("host-a", Duration::from_secs(30), Duration::from_secs(5));
        let mut b = Leadership::new("host-b", Duration::from_secs(30), Duration::from_secs(5));
        assert!(a.tick(dir.path(), &clock).unwrap());
        assert!(!b.tick(dir.path(), &clock).unwrap());
    }

    #[test]
    fn release_lets_another_instance_take_over() {
        let dir = tempdir().unwrap();
        let clock = FakeClock::new();
        let mut a = Leadership::new("host-a", Duration::from_secs(30), Duration::from_secs(5));
        let mut b = Leadership::new("host-b", Duration::from_secs(30), Duration::from_secs(5));
        assert!(a.tick(dir.path(), &clock).unwrap());
        a.release(dir.path()).unwrap();
        assert!(b.tick(dir.path(), &clock).unwrap());
    }
}
