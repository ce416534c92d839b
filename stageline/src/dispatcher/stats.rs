//! Dispatcher statistics.
//!
//! Counters are plain atomics so recording never contends with the
//! dispatcher's state lock.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of dispatcher activity.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Total submissions received
    pub total_requests: u64,
    /// Submissions that started a traversal
    pub admitted: u64,
    /// Submissions that joined an in-flight traversal
    pub coalesced: u64,
    /// Traversals that completed and notified their waiters
    pub completed: u64,
    /// Individual timeout notifications delivered to waiters
    pub timeout_notices: u64,
    /// Units forcibly removed from the in-flight table
    pub evicted: u64,
    /// Resubmissions of an already admitted unit handle
    pub rejected: u64,
}

impl DispatcherStats {
    /// Returns the coalescing ratio (0.0 to 1.0)
    pub fn coalescing_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.coalesced as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    total_requests: AtomicU64,
    admitted: AtomicU64,
    coalesced: AtomicU64,
    completed: AtomicU64,
    timeout_notices: AtomicU64,
    evicted: AtomicU64,
    rejected: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) -> u64 {
        self.coalesced.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout_notices(&self, count: usize) {
        self.timeout_notices
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            timeout_notices: self.timeout_notices.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
