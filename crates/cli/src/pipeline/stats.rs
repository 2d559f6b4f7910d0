//! Pipeline statistics.

use std::time::Duration;

use dispatcher::BackendStatus;
use observability::MetricsSummary;

/// Statistics from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineStats {
    /// Total duration of the run
    pub duration: Duration,

    /// Aggregated dispatch outcomes
    pub summary: MetricsSummary,

    /// Final status of every backend
    pub backends: Vec<BackendStatus>,
}

impl PipelineStats {
    /// Dispatches per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.total as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Eventbox Statistics                       ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Throughput: {:.2} msg/s", self.throughput());
        println!("   └─ Backends: {}", self.backends.len());

        println!("\n{}", self.summary);

        if !self.backends.is_empty() {
            println!("📮 Backends");
            for (i, backend) in self.backends.iter().enumerate() {
                let prefix = if i == self.backends.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                let m = &backend.metrics;
                println!(
                    "   {} {}: delivered={} failed={} rejected={} aborted={} (pool {}/{} busy)",
                    prefix,
                    backend.name,
                    m.delivered_count,
                    m.failure_count,
                    m.rejected_count,
                    m.aborted_count,
                    backend.pool.busy(),
                    backend.pool.total
                );
            }
        }

        println!();
    }
}
