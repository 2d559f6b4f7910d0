//! # Integration Tests
//!
//! End-to-end scenarios across the workspace crates.
//!
//! Covers:
//! - dispatch outcome wire format
//! - ChannelInput -> Dispatcher -> backends
//! - registry label resolution in front of the fan-out
//! - config-driven file delivery
//! - pool capacity and graceful drain

#[cfg(test)]
mod support {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use contracts::{Backend, DeliveryError, Message};

    /// Backend recording `(destination, content)` pairs
    pub struct RecordingBackend {
        name: String,
        delay: Duration,
        fail_with: Option<String>,
        pub received: Mutex<Vec<(String, String)>>,
    }

    impl RecordingBackend {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                delay: Duration::ZERO,
                fail_with: None,
                received: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(name: &str, reason: &str) -> Self {
            Self {
                fail_with: Some(reason.to_string()),
                ..Self::new(name)
            }
        }

        pub fn slow(name: &str, delay: Duration) -> Self {
            Self {
                delay,
                ..Self::new(name)
            }
        }

        pub fn count(&self) -> usize {
            self.received.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn publish(
            &self,
            destination: &str,
            content: &str,
            _timestamp: i64,
            _msg: &Message,
        ) -> Vec<DeliveryError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.received
                .lock()
                .unwrap()
                .push((destination.to_string(), content.to_string()));
            match &self.fail_with {
                Some(reason) => vec![DeliveryError::publish(reason.clone())],
                None => Vec::new(),
            }
        }
    }
}

#[cfg(test)]
mod wire_format_tests {
    use contracts::{DeliveryError, DispatchError, FilterError};
    use serde_json::json;

    #[test]
    fn test_backend_errors_render_as_strings() {
        let mut outcome = DispatchError::new();
        outcome.record_backend_error("X", DeliveryError::publish("e"));

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"BackendErrs": {"X": ["e"]}, "FilterInfo": "", "FilterErr": ""})
        );
    }

    #[test]
    fn test_filtered_outcome_carries_filter_error() {
        let mut outcome = DispatchError::new();
        outcome.set_filtered("quota", FilterError::new("quota", "over limit"));

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["FilterInfo"], "quota");
        assert!(value["FilterErr"].as_str().unwrap().contains("over limit"));
        assert_eq!(value["BackendErrs"], json!({}));
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use contracts::{DeliveryError, DispatcherSettings, Input, Labels, Message, RetrySettings};
    use dispatcher::{
        Dispatcher, DispatcherState, LabelRegistry, MemoryRegistry, RegisteredLabelFilter,
        REGISTERED_LABEL,
    };
    use inputs::ChannelInput;
    use serde_json::json;

    use crate::support::RecordingBackend;

    fn spawn_start(dispatcher: &Arc<Dispatcher>) -> tokio::task::JoinHandle<()> {
        let dispatcher = Arc::clone(dispatcher);
        tokio::spawn(async move { dispatcher.start().await.unwrap() })
    }

    async fn wait_running(dispatcher: &Dispatcher) {
        while dispatcher.state() != DispatcherState::Running {
            tokio::task::yield_now().await;
        }
    }

    /// ChannelInput -> Dispatcher -> two backends, one of them failing
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_channel_input_fans_out_and_isolates_failures() {
        let good = Arc::new(RecordingBackend::new("GOOD"));
        let bad = Arc::new(RecordingBackend::failing("BAD", "gateway down"));
        let input = Arc::new(ChannelInput::new("api", 16));
        let handle = input.handle();

        let dispatcher = Arc::new(
            Dispatcher::builder(DispatcherSettings::default())
                .register_subscriber(good.clone())
                .unwrap()
                .register_subscriber(bad.clone())
                .unwrap()
                .register_input(input)
                .build(),
        );
        let run = spawn_start(&dispatcher);
        wait_running(&dispatcher).await;

        let outcome = handle
            .send(
                Message::new("billing", "invoice ready")
                    .with_label("GOOD", "ops@example.com")
                    .with_label("BAD", json!(["+100", "+200"])),
            )
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"BackendErrs": {"BAD": ["gateway down"]}, "FilterInfo": "", "FilterErr": ""})
        );
        assert_eq!(
            *good.received.lock().unwrap(),
            vec![(
                "\"ops@example.com\"".to_string(),
                "\"invoice ready\"".to_string()
            )]
        );
        assert_eq!(bad.received.lock().unwrap()[0].0, r#"["+100","+200"]"#);

        // A label naming no backend is ignored.
        let ignored = handle
            .send(Message::new("billing", "x").with_label("NOBODY", "y"))
            .await
            .unwrap();
        assert!(ignored.is_ok());

        dispatcher.stop().await.unwrap();
        run.await.unwrap();

        let summary = dispatcher.stats_summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.partial_failures, 1);
        assert_eq!(summary.backend_failures.get("BAD"), Some(&1));
    }

    /// Registry references are expanded before the fan-out
    #[tokio::test]
    async fn test_registered_labels_route_to_backends() {
        let registry = Arc::new(MemoryRegistry::new());
        registry
            .put(
                "team/ops/oncall",
                Labels::from([("PAGER".into(), json!(["alice"]))]),
            )
            .await
            .unwrap();
        registry
            .put(
                "team/ops/leads",
                Labels::from([("PAGER".into(), json!(["bob", "alice"]))]),
            )
            .await
            .unwrap();

        let pager = Arc::new(RecordingBackend::new("PAGER"));
        let dispatcher = Dispatcher::builder(DispatcherSettings::default())
            .with_filter(Arc::new(RegisteredLabelFilter::new(registry)))
            .register_subscriber(pager.clone())
            .unwrap()
            .build();
        dispatcher.start().await.unwrap();

        let outcome = dispatcher
            .route(Message::new("alerts", "disk full").with_label(REGISTERED_LABEL, "team/ops/"))
            .await;
        assert!(outcome.is_ok());

        let received = pager.received.lock().unwrap().clone();
        assert_eq!(received.len(), 1);
        let destination: serde_json::Value = serde_json::from_str(&received[0].0).unwrap();
        let mut people: Vec<_> = destination
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        people.sort();
        assert_eq!(people, vec!["alice", "bob"]);

        let filtered = dispatcher
            .route(Message::new("alerts", "x").with_label(REGISTERED_LABEL, "team/dev"))
            .await;
        assert!(filtered.is_filtered());
        assert_eq!(
            serde_json::to_value(&filtered).unwrap()["FilterInfo"],
            "registered_label"
        );
        assert_eq!(pager.count(), 1);

        dispatcher.stop().await.unwrap();
    }

    /// A full pool with no retries reports exhaustion for that backend only
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_full_pool_reports_exhaustion() {
        let settings = DispatcherSettings {
            default_pool_size: 1,
            retry: RetrySettings {
                retries: 0,
                max_jitter_ms: 0,
                backoff_factor: 1.0,
            },
            ..Default::default()
        };
        let slow = Arc::new(RecordingBackend::slow("SLOW", Duration::from_millis(200)));
        let dispatcher = Arc::new(
            Dispatcher::builder(settings)
                .register_subscriber(slow.clone())
                .unwrap()
                .build(),
        );
        dispatcher.start().await.unwrap();

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                dispatcher
                    .route(Message::new("a", 1).with_label("SLOW", "x"))
                    .await
            })
        };
        while dispatcher.backend_status()[0].pool.idle > 0 {
            tokio::task::yield_now().await;
        }

        let second = dispatcher
            .route(Message::new("a", 2).with_label("SLOW", "x"))
            .await;
        let errs = &second.backend_errs["SLOW"];
        assert!(matches!(
            errs[0],
            DeliveryError::PoolExhausted { attempts: 1, .. }
        ));

        assert!(first.await.unwrap().is_ok());
        assert_eq!(dispatcher.backend_status()[0].metrics.rejected_count, 1);
        dispatcher.stop().await.unwrap();
    }

    /// Stop waits for queued and in-flight deliveries
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_drains_in_flight_deliveries() {
        let slow = Arc::new(RecordingBackend::slow("SLOW", Duration::from_millis(50)));
        let input = Arc::new(ChannelInput::new("api", 32));
        let handle = input.handle();
        let dispatcher = Arc::new(
            Dispatcher::builder(DispatcherSettings::default())
                .register_subscriber(slow.clone())
                .unwrap()
                .register_input(input.clone() as Arc<dyn Input>)
                .build(),
        );

        for i in 0..10 {
            handle
                .submit(Message::new("batch", i).with_label("SLOW", "sink"))
                .await
                .unwrap();
        }

        let run = spawn_start(&dispatcher);
        while input.metrics().snapshot().received == 0 {
            tokio::task::yield_now().await;
        }
        dispatcher.stop().await.unwrap();
        run.await.unwrap();

        assert_eq!(slow.count(), 10);
        assert_eq!(input.metrics().snapshot().delivered, 10);
        assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    }
}

#[cfg(test)]
mod config_tests {
    use std::sync::Arc;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ContractError, Message};
    use dispatcher::{create_backend, Dispatcher};
    use inputs::ChannelInput;

    /// Backends and pool sizes built from TOML deliver to a file
    #[tokio::test]
    async fn test_file_backend_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deliveries.jsonl");
        let toml = format!(
            r#"
            [dispatcher]
            default_pool_size = 4

            [[backends]]
            name = "AUDIT"
            backend_type = "file"
            pool_size = 2
            [backends.params]
            path = "{}"

            [[backends]]
            name = "LOG"
            backend_type = "log"
            "#,
            path.display()
        );
        let config = ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap();

        let input = Arc::new(ChannelInput::new("api", 8));
        let handle = input.handle();
        let mut builder = Dispatcher::builder(config.dispatcher_settings()).register_input(input);
        for backend in &config.backends {
            builder = builder
                .register_subscriber(create_backend(backend).await.unwrap())
                .unwrap();
        }
        let dispatcher = Arc::new(builder.build());

        let pools: Vec<_> = dispatcher
            .backend_status()
            .into_iter()
            .map(|s| (s.name, s.pool.total))
            .collect();
        assert_eq!(
            pools,
            vec![("AUDIT".to_string(), 2), ("LOG".to_string(), 4)]
        );

        let run = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.start().await })
        };

        let outcome = handle
            .send(
                Message::new("auth", "login")
                    .with_label("AUDIT", "security")
                    .with_label("LOG", "stdout"),
            )
            .await
            .unwrap();
        assert!(outcome.is_ok());

        dispatcher.stop().await.unwrap();
        run.await.unwrap().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0]["backend"], "AUDIT");
        assert_eq!(lines[0]["sender"], "auth");
        assert_eq!(lines[0]["destination"], "\"security\"");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let toml = r#"
            [dispatcher.retry]
            backoff_factor = 0.5
        "#;
        assert!(matches!(
            ConfigLoader::load_from_str(toml, ConfigFormat::Toml),
            Err(ContractError::ConfigValidation { .. })
        ));
    }
}
