//! FanOutFilter - terminal filter delivering a message to every labelled backend
//!
//! ```text
//!   msg.labels ──► { "EMAIL": [...], "SMS": [...], "UNKNOWN": .. }
//!                      │              │
//!                 EMAIL pool      SMS pool        (UNKNOWN: no backend, skipped)
//!                      │              │
//!                  publish()      publish()
//!                      └──── join ────┘──► DispatchError.backend_errs
//! ```
//!
//! A full pool is retried per [`RetryPolicy`]; a failing backend never
//! affects the others.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::oneshot;
use tracing::{debug, error, instrument, warn};

use contracts::{Backend, DeliveryError, DispatchError, Filter, Message, Value};
use worker_pool::{BoundedWorkerPool, PoolError};

use crate::metrics::BackendMetrics;
use crate::retry::RetryPolicy;

/// A registered backend with its private pool
pub(crate) struct BackendEntry {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) pool: Arc<BoundedWorkerPool>,
    pub(crate) metrics: Arc<BackendMetrics>,
}

pub(crate) type BackendTable = Arc<BTreeMap<String, BackendEntry>>;

/// Terminal step of the routing chain
pub struct FanOutFilter {
    backends: BackendTable,
    retry: RetryPolicy,
}

impl FanOutFilter {
    pub(crate) fn new(backends: BackendTable, retry: RetryPolicy) -> Self {
        Self { backends, retry }
    }

    /// Deliver `msg` to one backend and collect what it reported
    #[instrument(
        name = "fanout_deliver",
        skip_all,
        fields(backend = %name)
    )]
    async fn deliver(
        &self,
        name: &str,
        entry: &BackendEntry,
        label: &Value,
        content: Arc<str>,
        msg: Arc<Message>,
    ) -> Vec<DeliveryError> {
        let destination: Arc<str> = match serde_json::to_string(label) {
            Ok(s) => Arc::from(s),
            Err(e) => {
                return vec![DeliveryError::Encode {
                    backend: name.to_string(),
                    what: "destination",
                    message: e.to_string(),
                }]
            }
        };

        let mut retry = 0;
        let rx = loop {
            let (tx, rx) = oneshot::channel();
            let task = publish_task(
                Arc::clone(&entry.backend),
                Arc::clone(&destination),
                Arc::clone(&content),
                Arc::clone(&msg),
                tx,
            );

            match entry.pool.submit(task) {
                Ok(()) => break rx,
                Err(PoolError::NoMoreWorker { .. }) => {
                    entry.metrics.inc_rejected_count();
                    observability::record_pool_rejected(name);

                    if retry >= self.retry.retries {
                        warn!(backend = %name, attempts = retry + 1, "Pool exhausted, giving up");
                        return vec![DeliveryError::PoolExhausted {
                            backend: name.to_string(),
                            attempts: retry + 1,
                        }];
                    }
                    let delay = self.retry.delay(retry);
                    debug!(
                        backend = %name,
                        retry,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Pool full, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    entry.metrics.inc_rejected_count();
                    if matches!(e, PoolError::NotRunning { .. }) {
                        error!(backend = %name, "Worker pool not running");
                    } else {
                        warn!(backend = %name, error = %e, "Submission failed");
                    }
                    return vec![pool_fault(name, e)];
                }
            }
        };

        entry.metrics.inc_in_flight();
        observability::record_pool_idle(name, entry.pool.statistics().idle);
        let reported = rx.await;
        entry.metrics.dec_in_flight();

        match reported {
            Ok(errs) if errs.is_empty() => {
                entry.metrics.inc_delivered_count();
                observability::record_delivery(name, true);
                errs
            }
            Ok(errs) => {
                entry.metrics.inc_failure_count();
                observability::record_delivery(name, false);
                errs
            }
            Err(_) => {
                entry.metrics.inc_aborted_count();
                observability::record_delivery(name, false);
                error!(backend = %name, "Delivery task aborted before reporting");
                vec![DeliveryError::TaskAborted {
                    backend: name.to_string(),
                }]
            }
        }
    }
}

/// Delivery error recorded when the pool refuses a submission
fn pool_fault(backend: &str, err: PoolError) -> DeliveryError {
    let backend = backend.to_string();
    match err {
        PoolError::NoMoreWorker { .. } => DeliveryError::PoolExhausted {
            backend,
            attempts: 1,
        },
        PoolError::Timeout { .. } => DeliveryError::PoolTimeout { backend },
        PoolError::NotRunning { .. } | PoolError::Stopping { .. } => {
            DeliveryError::PoolNotRunning { backend }
        }
        e @ PoolError::WorkerJoin { .. } => DeliveryError::source(e),
    }
}

/// Task run on a backend worker; reports through `done`
///
/// If `publish` panics, `done` is dropped and the receiver observes the abort.
fn publish_task(
    backend: Arc<dyn Backend>,
    destination: Arc<str>,
    content: Arc<str>,
    msg: Arc<Message>,
    done: oneshot::Sender<Vec<DeliveryError>>,
) -> impl std::future::Future<Output = ()> + Send + 'static {
    async move {
        let errs = backend
            .publish(&destination, &content, msg.time, &msg)
            .await;
        // Receiver gone means the dispatch was dropped; nothing left to report to.
        let _ = done.send(errs);
    }
}

#[async_trait]
impl Filter for FanOutFilter {
    fn name(&self) -> &str {
        "fanout"
    }

    #[instrument(
        name = "fanout_filter",
        skip(self, msg, outcome),
        fields(sender = %msg.sender, labels = msg.labels.len())
    )]
    async fn filter(&self, msg: &mut Message, outcome: &mut DispatchError) {
        let targets: Vec<(&str, &BackendEntry, &Value)> = msg
            .labels
            .iter()
            .filter_map(|(key, value)| {
                self.backends
                    .get_key_value(key.as_str())
                    .map(|(name, entry)| (name.as_str(), entry, value))
            })
            .collect();

        if targets.is_empty() {
            debug!(sender = %msg.sender, "No label matches a registered backend");
            return;
        }

        let content: Arc<str> = match serde_json::to_string(&msg.content) {
            Ok(s) => Arc::from(s),
            Err(e) => {
                for (name, _, _) in &targets {
                    outcome.record_backend_error(
                        name,
                        DeliveryError::Encode {
                            backend: name.to_string(),
                            what: "content",
                            message: e.to_string(),
                        },
                    );
                }
                return;
            }
        };

        let shared = Arc::new(msg.clone());
        let deliveries = targets.iter().map(|(name, entry, label)| {
            let content = Arc::clone(&content);
            let shared = Arc::clone(&shared);
            async move { (*name, self.deliver(name, entry, label, content, shared).await) }
        });

        for (name, errs) in join_all(deliveries).await {
            outcome.record_backend_errors(name, errs);
        }
    }
}
