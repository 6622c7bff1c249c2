//! Transaction metrics
//!
//! Counters are updated at the outer transaction boundary only; nested
//! transactions are part of their outer transaction's attempt.
//!
//! A transaction is counted once in `total_started` and once in exactly one
//! of `total_committed`, `total_rolled_back` or `total_failed`. A commit is
//! counted as soon as it is published, but the transaction stays in
//! `active_count` until its committed callbacks have run. `total_conflicts`
//! counts every conflicting commit attempt, including the ones that were
//! retried successfully.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters owned by a `Memory`
///
/// # Memory Ordering
///
/// All counters use Relaxed ordering: they are observational only and do not
/// synchronize any other memory operation.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_rolled_back: AtomicU64,
    total_conflicts: AtomicU64,
    total_failed: AtomicU64,
}

impl MetricsRecorder {
    pub(crate) fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a published commit; the transaction stays active until
    /// [`MetricsRecorder::record_callbacks_done`]
    pub(crate) fn record_commit(&self) {
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_callbacks_done(&self) {
        self.finish();
    }

    pub(crate) fn record_rollback(&self) {
        self.finish();
        self.total_rolled_back.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.finish();
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.total_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MemoryMetrics {
        MemoryMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: self.total_started.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_rolled_back: self.total_rolled_back.load(Ordering::Relaxed),
            total_conflicts: self.total_conflicts.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }

    fn finish(&self) {
        // Saturating decrement
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }
}

/// Point-in-time transaction statistics of a `Memory`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryMetrics {
    /// Outer transactions currently running or committing
    pub active_count: u64,
    /// Outer transactions started
    pub total_started: u64,
    /// Outer transactions whose commit was published
    pub total_committed: u64,
    /// Outer transactions that returned `false`
    pub total_rolled_back: u64,
    /// Commit attempts rejected with a conflict
    pub total_conflicts: u64,
    /// Outer transactions that ended with an error
    pub total_failed: u64,
}

impl MemoryMetrics {
    /// Total transactions that finished, whatever the outcome
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_rolled_back + self.total_failed
    }

    /// Commit success rate (committed / started)
    pub fn commit_rate(&self) -> f64 {
        ratio(self.total_committed, self.total_started)
    }

    /// Conflicting commit attempts per started transaction
    pub fn conflict_rate(&self) -> f64 {
        ratio(self.total_conflicts, self.total_started)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}
