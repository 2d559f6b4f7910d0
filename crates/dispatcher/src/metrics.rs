//! Backend delivery metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single backend
#[derive(Debug, Default)]
pub struct BackendMetrics {
    /// Deliveries currently running on the pool
    in_flight: AtomicUsize,
    /// Publications that reported no error
    delivered_count: AtomicU64,
    /// Publications that reported at least one error
    failure_count: AtomicU64,
    /// Submissions refused by the pool (full or not running)
    rejected_count: AtomicU64,
    /// Tasks that ended without reporting
    aborted_count: AtomicU64,
}

impl BackendMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn inc_in_flight(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_in_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered_count.load(Ordering::Relaxed)
    }

    pub fn inc_delivered_count(&self) {
        self.delivered_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected_count.load(Ordering::Relaxed)
    }

    pub fn inc_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aborted_count(&self) -> u64 {
        self.aborted_count.load(Ordering::Relaxed)
    }

    pub fn inc_aborted_count(&self) {
        self.aborted_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight(),
            delivered_count: self.delivered_count(),
            failure_count: self.failure_count(),
            rejected_count: self.rejected_count(),
            aborted_count: self.aborted_count(),
        }
    }
}

/// Snapshot of backend metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub in_flight: usize,
    pub delivered_count: u64,
    pub failure_count: u64,
    pub rejected_count: u64,
    pub aborted_count: u64,
}
