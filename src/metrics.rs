//! Election metrics.
//!
//! Cheap atomics-backed counters shared via `Arc`, suitable for polling or
//! export by the embedder. No exporter dependency; everything is readable
//! through `snapshot`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ElectionMetrics {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    // Gauge
    leading: AtomicBool,

    // Counters
    acquire_attempts: AtomicU64,
    acquire_successes: AtomicU64,
    renew_successes: AtomicU64,
    renew_failures: AtomicU64,
    conflicts: AtomicU64,
    transient_errors: AtomicU64,
    takeovers: AtomicU64,
}

impl ElectionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_leading(&self, leading: bool) {
        self.inner.leading.store(leading, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire_attempt(&self) {
        self.inner.acquire_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire_success(&self) {
        self.inner.acquire_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_renew_success(&self) {
        self.inner.renew_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_renew_failure(&self) {
        self.inner.renew_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.inner.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transient_error(&self) {
        self.inner.transient_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// An acquisition that replaced a previous (expired or absent) holder.
    pub(crate) fn record_takeover(&self) {
        self.inner.takeovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn is_leading(&self) -> bool {
        self.inner.leading.load(Ordering::Relaxed)
    }

    /// Point-in-time view of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            leading: self.inner.leading.load(Ordering::Relaxed),
            acquire_attempts: self.inner.acquire_attempts.load(Ordering::Relaxed),
            acquire_successes: self.inner.acquire_successes.load(Ordering::Relaxed),
            renew_successes: self.inner.renew_successes.load(Ordering::Relaxed),
            renew_failures: self.inner.renew_failures.load(Ordering::Relaxed),
            conflicts: self.inner.conflicts.load(Ordering::Relaxed),
            transient_errors: self.inner.transient_errors.load(Ordering::Relaxed),
            takeovers: self.inner.takeovers.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the election counters at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub leading: bool,
    pub acquire_attempts: u64,
    pub acquire_successes: u64,
    pub renew_successes: u64,
    pub renew_failures: u64,
    pub conflicts: u64,
    pub transient_errors: u64,
    pub takeovers: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = ElectionMetrics::new();
        metrics.record_acquire_attempt();
        metrics.record_acquire_attempt();
        metrics.record_acquire_success();
        metrics.record_conflict();
        metrics.set_leading(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.acquire_attempts, 2);
        assert_eq!(snapshot.acquire_successes, 1);
        assert_eq!(snapshot.conflicts, 1);
        assert!(snapshot.leading);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = ElectionMetrics::new();
        let clone = metrics.clone();
        clone.record_renew_success();
        assert_eq!(metrics.snapshot().renew_successes, 1);
    }
}
