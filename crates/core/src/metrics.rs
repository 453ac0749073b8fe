// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory metrics ring buffer (ambient stack: no Prometheus exposition,
//! `dagctl status --metrics` and the coordinator health rollup read this
//! directly).

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A single recorded sample: a named counter/gauge value at a point in
/// time, expressed in epoch milliseconds via the caller's [`crate::Clock`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub value: f64,
    pub at_ms: u64,
}

/// Bounded ring buffer of recent samples, shared across tasks within one
/// process (one per daemon).
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<Mutex<VecDeque<Sample>>>,
    capacity: usize,
}

impl MetricsRegistry {
    pub fn new(capacity: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))), capacity }
    }

    pub fn record(&self, name: &'static str, value: f64, at_ms: u64) {
        let mut buf = self.inner.lock();
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(Sample { name, value, at_ms });
    }

    /// Samples with `name`, oldest first.
    pub fn samples(&self, name: &str) -> Vec<Sample> {
        self.inner.lock().iter().filter(|s| s.name == name).cloned().collect()
    }

    /// Latest value recorded for `name`, if any.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.inner.lock().iter().rev().find(|s| s.name == name).map(|s| s.value)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        // MONITORING_RETENTION default: keep the last 4096 samples per process.
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_once_capacity_reached() {
        let reg = MetricsRegistry::new(2);
        reg.record("active_runs", 1.0, 100);
        reg.record("active_runs", 2.0, 200);
        reg.record("active_runs", 3.0, 300);
        let samples = reg.samples("active_runs");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 2.0);
        assert_eq!(samples[1].value, 3.0);
    }

    #[test]
    fn latest_returns_most_recent_matching_sample() {
        let reg = MetricsRegistry::new(8);
        reg.record("queue_depth", 1.0, 100);
        reg.record("active_runs", 5.0, 150);
        reg.record("queue_depth", 2.0, 200);
        assert_eq!(reg.latest("queue_depth"), Some(2.0));
        assert_eq!(reg.latest("missing"), None);
    }
}
