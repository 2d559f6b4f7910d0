//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::EventboxConfig;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if let Some(pool_size) = args.pool_size {
        anyhow::ensure!(pool_size > 0, "--pool-size must be greater than zero");
        info!(pool_size, "Overriding default pool size from CLI");
        config.dispatcher.default_pool_size = pool_size;
    }

    info!(
        backends = config.backends.len(),
        inputs = config.inputs.len(),
        default_pool_size = config.dispatcher.default_pool_size,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        config,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    });

    info!("Starting dispatcher...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        dispatched = stats.summary.total,
        partial_failures = stats.summary.partial_failures,
        duration_secs = stats.duration.as_secs_f64(),
        "Dispatcher finished"
    );
    stats.print_summary();

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &EventboxConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Dispatcher:");
    println!("  Default pool size: {}", config.dispatcher.default_pool_size);
    println!(
        "  Retry: {} retries, jitter < {}ms, backoff x{}",
        config.dispatcher.retry.retries,
        config.dispatcher.retry.max_jitter_ms,
        config.dispatcher.retry.backoff_factor
    );

    println!("\nBackends ({}):", config.backends.len());
    for backend in &config.backends {
        println!(
            "  - {} ({:?}) - pool {}",
            backend.name,
            backend.backend_type,
            config.pool_size_for(&backend.name)
        );
    }

    if !config.inputs.is_empty() {
        println!("\nInputs ({}):", config.inputs.len());
        for input in &config.inputs {
            println!("  - {} ({:?})", input.name, input.input_type);
        }
    }

    println!();
}
