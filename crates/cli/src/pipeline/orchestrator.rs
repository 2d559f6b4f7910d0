//! Pipeline orchestrator - assembles the dispatcher and drives its lifecycle.

use std::future::Future;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::EventboxConfig;
use dispatcher::{create_backend, Dispatcher, DispatcherError};
use tracing::{info, warn};

use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The loaded eventbox configuration
    pub config: EventboxConfig,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the dispatcher until its inputs finish or `shutdown` resolves
    ///
    /// The dispatcher is stopped in both cases, so in-flight deliveries
    /// complete before the statistics are collected.
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let dispatcher = build_dispatcher(&self.config.config).await?;

        let run = dispatcher.start();
        tokio::pin!(run);
        tokio::pin!(shutdown);

        // `run` is polled first so the dispatcher is Running before a stop.
        let (run_result, stop_result) = tokio::select! {
            biased;
            result = &mut run => {
                info!("All inputs finished");
                (result, dispatcher.stop().await)
            }
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping dispatcher...");
                tokio::join!(run, dispatcher.stop())
            }
        };

        if let Err(e) = stop_result {
            warn!(error = %e, "Dispatcher did not stop cleanly");
        }
        run_result.context("Dispatcher run failed")?;

        Ok(PipelineStats {
            duration: start_time.elapsed(),
            summary: dispatcher.stats_summary(),
            backends: dispatcher.backend_status(),
        })
    }
}

/// Build a dispatcher with every backend and input named in `config`
pub async fn build_dispatcher(config: &EventboxConfig) -> Result<Dispatcher, DispatcherError> {
    let mut builder = Dispatcher::builder(config.dispatcher_settings());

    for backend_config in &config.backends {
        let backend = create_backend(backend_config).await?;
        builder = builder.register_subscriber(backend)?;
    }

    for input_config in &config.inputs {
        info!(
            input = %input_config.name,
            input_type = ?input_config.input_type,
            "Input created"
        );
        builder = builder.register_input(inputs::create_input(input_config));
    }

    Ok(builder.build())
}
