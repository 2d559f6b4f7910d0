//! Dispatch metrics
//!
//! Emits Prometheus series through the `metrics` facade and aggregates
//! dispatch outcomes in memory for end-of-run summaries.

use std::collections::HashMap;
use std::fmt;

use contracts::DispatchError;
use metrics::{counter, gauge, histogram};

/// Coarse classification of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// Every addressed backend succeeded
    Delivered,
    /// A filter aborted the chain
    Filtered,
    /// At least one backend reported errors
    PartialFailure,
}

impl DispatchOutcome {
    pub fn of(outcome: &DispatchError) -> Self {
        if outcome.is_filtered() {
            Self::Filtered
        } else if outcome.is_ok() {
            Self::Delivered
        } else {
            Self::PartialFailure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Filtered => "filtered",
            Self::PartialFailure => "partial_failure",
        }
    }
}

/// Record one completed dispatch
pub fn record_dispatch(outcome: &DispatchError, latency_ms: f64) {
    let kind = DispatchOutcome::of(outcome);
    counter!("eventbox_dispatch_total", "outcome" => kind.as_str()).increment(1);
    histogram!("eventbox_dispatch_latency_ms").record(latency_ms);

    for (backend, errs) in &outcome.backend_errs {
        counter!("eventbox_backend_errors_total", "backend" => backend.clone())
            .increment(errs.len() as u64);
    }
}

/// Record one publication attempt that reached a backend
pub fn record_delivery(backend: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "eventbox_delivery_total",
        "backend" => backend.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record a submission refused by a backend's pool
pub fn record_pool_rejected(backend: &str) {
    counter!("eventbox_pool_rejected_total", "backend" => backend.to_string()).increment(1);
}

/// Record the idle worker count of a backend's pool
pub fn record_pool_idle(backend: &str, idle: usize) {
    gauge!("eventbox_pool_idle_workers", "backend" => backend.to_string()).set(idle as f64);
}

/// In-memory dispatch aggregator
#[derive(Debug, Clone, Default)]
pub struct DispatchStatsAggregator {
    /// Dispatches seen
    pub total: u64,

    /// Dispatches with no errors
    pub delivered: u64,

    /// Dispatches aborted by a filter
    pub filtered: u64,

    /// Dispatches with at least one backend error
    pub partial_failures: u64,

    /// Errors per backend
    pub backend_failures: HashMap<String, u64>,

    /// Dispatch latency (ms)
    pub latency: RunningStats,
}

impl DispatchStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one dispatch into the totals
    pub fn update(&mut self, outcome: &DispatchError, latency_ms: f64) {
        self.total += 1;
        match DispatchOutcome::of(outcome) {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Filtered => self.filtered += 1,
            DispatchOutcome::PartialFailure => self.partial_failures += 1,
        }
        for (backend, errs) in &outcome.backend_errs {
            *self.backend_failures.entry(backend.clone()).or_insert(0) += errs.len() as u64;
        }
        self.latency.push(latency_ms);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total: self.total,
            delivered: self.delivered,
            filtered: self.filtered,
            partial_failures: self.partial_failures,
            failure_rate: if self.total > 0 {
                self.partial_failures as f64 / self.total as f64 * 100.0
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency),
            backend_failures: self.backend_failures.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total: u64,
    pub delivered: u64,
    pub filtered: u64,
    pub partial_failures: u64,
    pub failure_rate: f64,
    pub latency_ms: StatsSummary,
    pub backend_failures: HashMap<String, u64>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Dispatch Summary ===")?;
        writeln!(f, "Total dispatches: {}", self.total)?;
        writeln!(f, "Delivered: {}", self.delivered)?;
        writeln!(f, "Filtered: {}", self.filtered)?;
        writeln!(
            f,
            "Partial failures: {} ({:.2}%)",
            self.partial_failures, self.failure_rate
        )?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.backend_failures.is_empty() {
            let mut backends: Vec<_> = self.backend_failures.iter().collect();
            backends.sort();
            writeln!(f, "Backend errors:")?;
            for (backend, count) in backends {
                writeln!(f, "  {}: {}", backend, count)?;
            }
        }

        Ok(())
    }
}

/// Summary statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
