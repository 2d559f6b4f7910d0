//! Input metrics

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::DispatchError;

/// Per-input counters
#[derive(Debug, Default)]
pub struct InputMetrics {
    received: AtomicU64,
    parse_errors: AtomicU64,
    delivered: AtomicU64,
    filtered: AtomicU64,
    failed: AtomicU64,
}

impl InputMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_received(&self, input: &str) {
        self.received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("eventbox_input_messages_total", "input" => input.to_string())
            .increment(1);
    }

    pub fn record_parse_error(&self, input: &str) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("eventbox_input_parse_errors_total", "input" => input.to_string())
            .increment(1);
    }

    /// Record how a dispatch ended
    pub fn record_outcome(&self, outcome: &DispatchError) {
        let counter = if outcome.is_filtered() {
            &self.filtered
        } else if outcome.is_ok() {
            &self.delivered
        } else {
            &self.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Messages accepted from the transport
    pub received: u64,

    /// Lines that were not valid messages
    pub parse_errors: u64,

    /// Dispatches with no errors
    pub delivered: u64,

    /// Dispatches aborted by a filter
    pub filtered: u64,

    /// Dispatches with backend errors
    pub failed: u64,
}
