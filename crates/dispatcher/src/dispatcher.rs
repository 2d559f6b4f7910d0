//! Dispatcher - owns inputs, backends and their pools
//!
//! ## Lifecycle
//! ```text
//!   DispatcherBuilder ──build()──► Unstarted ──start()──► Running ──stop()──► Stopping ──► Stopped
//! ```
//! Registration only exists on the builder, so the backend and input sets
//! are fixed once the dispatcher is built.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use tracing::{error, info, instrument};

use contracts::{
    Backend, DispatchError, DispatcherSettings, Filter, Input, Message, MessageHandler, Value,
};
use observability::MetricsSummary;
use worker_pool::{BoundedWorkerPool, PoolStatistics};

use crate::error::DispatcherError;
use crate::fanout::{BackendEntry, BackendTable, FanOutFilter};
use crate::metrics::{BackendMetrics, MetricsSnapshot};
use crate::retry::RetryPolicy;
use crate::router::Router;

/// Dispatcher lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Unstarted,
    Running,
    Stopping,
    Stopped,
}

/// Status report of one backend
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub name: String,
    /// Backend-defined status document
    pub status: Value,
    pub pool: PoolStatistics,
    pub metrics: MetricsSnapshot,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    settings: DispatcherSettings,
    retry: RetryPolicy,
    inputs: Vec<Arc<dyn Input>>,
    backends: BTreeMap<String, BackendEntry>,
    filters: Vec<Arc<dyn Filter>>,
}

impl DispatcherBuilder {
    /// Create a new DispatcherBuilder
    pub fn new(settings: DispatcherSettings) -> Self {
        let retry = RetryPolicy::from(&settings.retry);
        Self {
            settings,
            retry,
            inputs: Vec::new(),
            backends: BTreeMap::new(),
            filters: Vec::new(),
        }
    }

    /// Override the retry policy derived from the settings
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Append a non-terminal filter; filters run in registration order
    pub fn with_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an input served by the dispatcher
    pub fn register_input(mut self, input: Arc<dyn Input>) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add a backend under its name, with a dedicated worker pool
    ///
    /// # Errors
    /// `DuplicateBackend` if the name is already registered.
    pub fn register_subscriber(
        mut self,
        backend: Arc<dyn Backend>,
    ) -> Result<Self, DispatcherError> {
        let name = backend.name().to_string();
        if self.backends.contains_key(&name) {
            return Err(DispatcherError::DuplicateBackend { name });
        }

        let capacity = self.settings.pool_size_for(&name);
        let pool = Arc::new(BoundedWorkerPool::new(name.clone(), capacity));
        info!(backend = %name, capacity, "Backend registered");

        self.backends.insert(
            name,
            BackendEntry {
                backend,
                pool,
                metrics: Arc::new(BackendMetrics::new()),
            },
        );
        Ok(self)
    }

    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(
            backends = self.backends.len(),
            inputs = self.inputs.len(),
            filters = self.filters.len()
        )
    )]
    pub fn build(self) -> Dispatcher {
        let backends: BackendTable = Arc::new(self.backends);
        let fanout = FanOutFilter::new(Arc::clone(&backends), self.retry);
        let router = Arc::new(Router::new(self.filters, fanout));

        Dispatcher {
            router,
            backends,
            inputs: self.inputs,
            state: Mutex::new(DispatcherState::Unstarted),
        }
    }
}

/// The Dispatcher that fans messages out to backends
pub struct Dispatcher {
    router: Arc<Router>,
    backends: BackendTable,
    inputs: Vec<Arc<dyn Input>>,
    state: Mutex<DispatcherState>,
}

impl Dispatcher {
    pub fn builder(settings: DispatcherSettings) -> DispatcherBuilder {
        DispatcherBuilder::new(settings)
    }

    pub fn state(&self) -> DispatcherState {
        *self.lock_state()
    }

    /// Router shared with the inputs
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Route one message directly, bypassing the inputs
    pub async fn route(&self, msg: Message) -> DispatchError {
        self.router.dispatch(msg).await
    }

    /// Start every pool, then serve every input until they all return
    ///
    /// # Errors
    /// - `InvalidState` unless the dispatcher is `Unstarted`
    /// - `Inputs` listing every input whose run loop failed
    #[instrument(
        name = "dispatcher_start",
        skip(self),
        fields(backends = self.backends.len(), inputs = self.inputs.len())
    )]
    pub async fn start(&self) -> Result<(), DispatcherError> {
        {
            let mut state = self.lock_state();
            if *state != DispatcherState::Unstarted {
                return Err(DispatcherError::InvalidState {
                    operation: "start",
                    state: *state,
                });
            }
            for entry in self.backends.values() {
                entry.pool.start()?;
            }
            *state = DispatcherState::Running;
        }
        info!("Dispatcher started");

        let handler: Arc<dyn MessageHandler> = self.router.clone();
        let runs = self.inputs.iter().map(|input| {
            let handler = Arc::clone(&handler);
            async move { (input.name().to_string(), input.start(handler).await) }
        });

        let failures: Vec<String> = join_all(runs)
            .await
            .into_iter()
            .filter_map(|(name, result)| {
                result.err().map(|e| {
                    error!(input = %name, error = %e, "Input failed");
                    format!("{name}: {e}")
                })
            })
            .collect();

        info!(failed = failures.len(), "All inputs returned");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatcherError::Inputs { failures })
        }
    }

    /// Stop every input, then every pool, letting in-flight deliveries finish
    ///
    /// # Errors
    /// - `InvalidState` unless the dispatcher is `Running`
    /// - `Shutdown` listing every input or pool that failed to stop
    #[instrument(name = "dispatcher_stop", skip(self))]
    pub async fn stop(&self) -> Result<(), DispatcherError> {
        {
            let mut state = self.lock_state();
            if *state != DispatcherState::Running {
                return Err(DispatcherError::InvalidState {
                    operation: "stop",
                    state: *state,
                });
            }
            *state = DispatcherState::Stopping;
        }
        info!("Dispatcher stopping");

        let mut failures = Vec::new();

        let input_stops = self
            .inputs
            .iter()
            .map(|input| async move { (input.name().to_string(), input.stop().await) });
        for (name, result) in join_all(input_stops).await {
            if let Err(e) = result {
                error!(input = %name, error = %e, "Input failed to stop");
                failures.push(format!("input {name}: {e}"));
            }
        }

        let pool_stops = self
            .backends
            .iter()
            .map(|(name, entry)| async move { (name, entry.pool.stop().await) });
        for (name, result) in join_all(pool_stops).await {
            if let Err(e) = result {
                error!(backend = %name, error = %e, "Pool failed to stop");
                failures.push(format!("backend {name}: {e}"));
            }
        }

        *self.lock_state() = DispatcherState::Stopped;
        info!(failed = failures.len(), "Dispatcher stopped");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatcherError::Shutdown { failures })
        }
    }

    /// Status, pool occupancy and delivery metrics of every backend
    pub fn backend_status(&self) -> Vec<BackendStatus> {
        self.backends
            .iter()
            .map(|(name, entry)| BackendStatus {
                name: name.clone(),
                status: entry.backend.status(),
                pool: entry.pool.statistics(),
                metrics: entry.metrics.snapshot(),
            })
            .collect()
    }

    /// Aggregated dispatch statistics
    pub fn stats_summary(&self) -> MetricsSummary {
        self.router.stats_summary()
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use contracts::{ContractError, DeliveryError, FilterError};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Backend recording every destination it receives
    struct FakeBackend {
        name: String,
        fail_with: Option<String>,
        panics: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeBackend {
        fn ok(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fail_with: None,
                panics: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &str, message: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fail_with: Some(message.into()),
                panics: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn panicking(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                fail_with: None,
                panics: true,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(
            &self,
            destination: &str,
            _content: &str,
            _timestamp: i64,
            _msg: &Message,
        ) -> Vec<DeliveryError> {
            self.calls.lock().unwrap().push(destination.to_string());
            if self.panics {
                panic!("backend {} exploded", self.name);
            }
            match &self.fail_with {
                Some(message) => vec![DeliveryError::publish(message.clone())],
                None => Vec::new(),
            }
        }
    }

    /// Backend that holds its worker until released
    struct GatedBackend {
        entered: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl Backend for GatedBackend {
        fn name(&self) -> &str {
            "SLOW"
        }

        async fn publish(&self, _: &str, _: &str, _: i64, _: &Message) -> Vec<DeliveryError> {
            self.entered.fetch_add(1, Ordering::SeqCst);
            self.release.notified().await;
            Vec::new()
        }
    }

    /// Input whose run loop blocks until stopped
    #[derive(Default)]
    struct BlockingInput {
        stop: Notify,
        fail: bool,
        stopped: AtomicBool,
    }

    #[async_trait]
    impl Input for BlockingInput {
        fn name(&self) -> &str {
            "blocking"
        }

        async fn start(&self, _handler: Arc<dyn MessageHandler>) -> Result<(), ContractError> {
            if self.fail {
                return Err(ContractError::input("blocking", "transport refused"));
            }
            self.stop.notified().await;
            Ok(())
        }

        async fn stop(&self) -> Result<(), ContractError> {
            self.stopped.store(true, Ordering::SeqCst);
            self.stop.notify_one();
            Ok(())
        }
    }

    /// Filter that rejects every message
    struct RejectAll;

    #[async_trait]
    impl Filter for RejectAll {
        fn name(&self) -> &str {
            "reject_all"
        }

        async fn filter(&self, _msg: &mut Message, outcome: &mut DispatchError) {
            outcome.filter_err = Some(FilterError::new("reject_all", "closed for maintenance"));
        }
    }

    fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new(DispatcherSettings::default()).with_retry_policy(RetryPolicy::none())
    }

    async fn started(dispatcher: Dispatcher) -> Arc<Dispatcher> {
        let dispatcher = Arc::new(dispatcher);
        let runner = Arc::clone(&dispatcher);
        tokio::spawn(async move { runner.start().await });
        while dispatcher.state() != DispatcherState::Running {
            tokio::task::yield_now().await;
        }
        dispatcher
    }

    #[tokio::test]
    async fn test_fake_backend_empty_errors_is_ok() {
        let fake = FakeBackend::ok("FAKE");
        let dispatcher =
            started(builder().register_subscriber(fake.clone()).unwrap().build()).await;

        let outcome = dispatcher
            .route(Message::new("tester", "hi").with_label("FAKE", "dest"))
            .await;

        assert!(outcome.is_ok());
        assert_eq!(fake.calls(), vec!["\"dest\""]);
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_matching_label_is_noop() {
        let fake = FakeBackend::ok("FAKE");
        let dispatcher =
            started(builder().register_subscriber(fake.clone()).unwrap().build()).await;

        let outcome = dispatcher
            .route(Message::new("tester", "hi").with_label("OTHER", "x"))
            .await;

        assert!(outcome.is_ok());
        assert!(fake.calls().is_empty());
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_error_isolation() {
        let broken = FakeBackend::failing("SMS", "gateway down");
        let healthy = FakeBackend::ok("EMAIL");
        let dispatcher = started(
            builder()
                .register_subscriber(broken.clone())
                .unwrap()
                .register_subscriber(healthy.clone())
                .unwrap()
                .build(),
        )
        .await;

        let outcome = dispatcher
            .route(
                Message::new("tester", "hi")
                    .with_label("SMS", json!(["+100"]))
                    .with_label("EMAIL", json!(["a@example.com"])),
            )
            .await;

        assert_eq!(outcome.backend_errs.len(), 1);
        assert_eq!(outcome.backend_errs["SMS"][0].to_string(), "gateway down");
        assert_eq!(healthy.calls(), vec![r#"["a@example.com"]"#]);
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panicking_backend_is_contained() {
        let bomb = FakeBackend::panicking("BOMB");
        let healthy = FakeBackend::ok("EMAIL");
        let dispatcher = started(
            builder()
                .register_subscriber(bomb.clone())
                .unwrap()
                .register_subscriber(healthy.clone())
                .unwrap()
                .build(),
        )
        .await;

        for _ in 0..2 {
            let outcome = dispatcher
                .route(
                    Message::new("tester", "hi")
                        .with_label("BOMB", "x")
                        .with_label("EMAIL", "y"),
                )
                .await;
            assert!(matches!(
                outcome.backend_errs["BOMB"][..],
                [DeliveryError::TaskAborted { .. }]
            ));
            assert!(!outcome.backend_errs.contains_key("EMAIL"));
        }

        assert_eq!(bomb.calls().len(), 2);
        assert_eq!(healthy.calls().len(), 2);
        let status = dispatcher.backend_status();
        let bomb_status = status.iter().find(|s| s.name == "BOMB").unwrap();
        assert_eq!(bomb_status.metrics.aborted_count, 2);
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_pool_retries_then_exhausts() {
        let gated = Arc::new(GatedBackend {
            entered: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let mut settings = DispatcherSettings::default();
        settings.pool_sizes.insert("SLOW".into(), 1);
        let retry = RetryPolicy {
            retries: 1,
            max_jitter: Duration::from_millis(10),
            backoff_factor: 1.0,
        };
        let dispatcher = started(
            DispatcherBuilder::new(settings)
                .with_retry_policy(retry)
                .register_subscriber(gated.clone())
                .unwrap()
                .build(),
        )
        .await;

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .route(Message::new("a", "1").with_label("SLOW", "x"))
                    .await
            })
        };
        while gated.entered.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = dispatcher
            .route(Message::new("b", "2").with_label("SLOW", "x"))
            .await;
        assert!(matches!(
            second.backend_errs["SLOW"][..],
            [DeliveryError::PoolExhausted { attempts: 2, .. }]
        ));

        gated.release.notify_one();
        assert!(first.await.unwrap().is_ok());

        let status = dispatcher.backend_status();
        assert_eq!(status[0].metrics.rejected_count, 2);
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_route_before_start_reports_pool_not_running() {
        let dispatcher = builder()
            .register_subscriber(FakeBackend::ok("FAKE"))
            .unwrap()
            .build();

        let outcome = dispatcher
            .route(Message::new("tester", "hi").with_label("FAKE", "x"))
            .await;

        assert!(matches!(
            outcome.backend_errs["FAKE"][..],
            [DeliveryError::PoolNotRunning { .. }]
        ));
    }

    #[tokio::test]
    async fn test_relabel_is_last_write_wins() {
        let fake = FakeBackend::ok("FAKE");
        let dispatcher =
            started(builder().register_subscriber(fake.clone()).unwrap().build()).await;

        let outcome = dispatcher
            .route(
                Message::new("tester", "hi")
                    .with_label("FAKE", "first")
                    .with_label("FAKE", "second"),
            )
            .await;

        assert!(outcome.is_ok());
        assert_eq!(fake.calls(), vec!["\"second\""]);
        dispatcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_filter_short_circuits_fanout() {
        let fake = FakeBackend::ok("FAKE");
        let dispatcher = started(
            builder()
                .with_filter(Arc::new(RejectAll))
                .register_subscriber(fake.clone())
                .unwrap()
                .build(),
        )
        .await;

        let outcome = dispatcher
            .route(Message::new("tester", "hi").with_label("FAKE", "x"))
            .await;

        assert!(outcome.is_filtered());
        assert_eq!(outcome.filter_info, "reject_all");
        assert!(fake.calls().is_empty());
        assert_eq!(dispatcher.stats_summary().filtered, 1);
        dispatcher.stop().await.unwrap();
    }

    #[test]
    fn test_duplicate_backend_rejected() {
        let result = builder()
            .register_subscriber(FakeBackend::ok("FAKE"))
            .unwrap()
            .register_subscriber(FakeBackend::ok("FAKE"));

        assert!(matches!(
            result,
            Err(DispatcherError::DuplicateBackend { ref name }) if name == "FAKE"
        ));
    }

    #[tokio::test]
    async fn test_start_blocks_until_stop() {
        let input = Arc::new(BlockingInput::default());
        let dispatcher = Arc::new(
            builder()
                .register_input(input.clone())
                .register_subscriber(FakeBackend::ok("FAKE"))
                .unwrap()
                .build(),
        );

        let runner = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.start().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!runner.is_finished());
        assert_eq!(dispatcher.state(), DispatcherState::Running);
        assert_eq!(dispatcher.backend_status()[0].pool.total, 100);

        dispatcher.stop().await.unwrap();
        runner.await.unwrap().unwrap();

        assert!(input.stopped.load(Ordering::SeqCst));
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
        assert_eq!(dispatcher.backend_status()[0].pool, PoolStatistics::default());
    }

    #[tokio::test]
    async fn test_lifecycle_state_errors() {
        let dispatcher = started(builder().build()).await;
        assert!(matches!(
            dispatcher.start().await,
            Err(DispatcherError::InvalidState { operation: "start", .. })
        ));

        dispatcher.stop().await.unwrap();
        assert!(matches!(
            dispatcher.stop().await,
            Err(DispatcherError::InvalidState {
                operation: "stop",
                state: DispatcherState::Stopped
            })
        ));
    }

    #[tokio::test]
    async fn test_input_failures_are_collected() {
        let input = Arc::new(BlockingInput {
            fail: true,
            ..Default::default()
        });
        let dispatcher = builder().register_input(input).build();

        let err = dispatcher.start().await.unwrap_err();
        match err {
            DispatcherError::Inputs { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("blocking:"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
