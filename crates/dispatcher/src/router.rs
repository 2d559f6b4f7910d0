//! Router - ordered filter chain ending in the fan-out

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use contracts::{DispatchError, Filter, Message, MessageHandler};
use observability::{DispatchStatsAggregator, MetricsSummary};

use crate::fanout::FanOutFilter;

/// Runs filters strictly in order, then the terminal fan-out
pub struct Router {
    filters: Vec<Arc<dyn Filter>>,
    fanout: FanOutFilter,
    stats: Mutex<DispatchStatsAggregator>,
}

impl Router {
    pub(crate) fn new(filters: Vec<Arc<dyn Filter>>, fanout: FanOutFilter) -> Self {
        Self {
            filters,
            fanout,
            stats: Mutex::new(DispatchStatsAggregator::new()),
        }
    }

    /// Route one message and return its aggregated outcome
    #[instrument(
        name = "router_dispatch",
        skip(self, msg),
        fields(sender = %msg.sender, labels = msg.labels.len())
    )]
    pub async fn dispatch(&self, mut msg: Message) -> DispatchError {
        let started = Instant::now();
        let mut outcome = DispatchError::new();

        for filter in &self.filters {
            filter.filter(&mut msg, &mut outcome).await;
            if outcome.is_filtered() {
                if outcome.filter_info.is_empty() {
                    outcome.filter_info = filter.name().to_string();
                }
                break;
            }
        }

        if !outcome.is_filtered() {
            self.fanout.filter(&mut msg, &mut outcome).await;
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        if outcome.is_filtered() {
            warn!(
                sender = %msg.sender,
                info = %outcome.filter_info,
                outcome = %outcome,
                "Message filtered"
            );
        } else if !outcome.is_ok() {
            let capacity = outcome
                .backend_errs
                .values()
                .flatten()
                .filter(|e| e.is_capacity())
                .count();
            warn!(
                sender = %msg.sender,
                failed = outcome.backend_error_count(),
                capacity,
                backends = ?outcome.failed_backends().collect::<Vec<_>>(),
                outcome = %outcome,
                "Dispatch completed with backend errors"
            );
        } else {
            debug!(sender = %msg.sender, latency_ms, "Dispatch completed");
        }

        observability::record_dispatch(&outcome, latency_ms);
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update(&outcome, latency_ms);

        outcome
    }

    /// Summary of every dispatch routed so far
    pub fn stats_summary(&self) -> MetricsSummary {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .summary()
    }
}

#[async_trait]
impl MessageHandler for Router {
    async fn route(&self, msg: Message) -> DispatchError {
        self.dispatch(msg).await
    }
}
