//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::EventboxConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    default_pool_size: usize,
    retry: RetryInfo,
    backends: Vec<BackendInfo>,
    inputs: Vec<InputInfo>,
}

#[derive(Serialize)]
struct RetryInfo {
    retries: u32,
    max_jitter_ms: u64,
    backoff_factor: f64,
}

#[derive(Serialize)]
struct BackendInfo {
    name: String,
    backend_type: String,
    pool_size: usize,
    #[serde(skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    params: std::collections::BTreeMap<String, String>,
}

#[derive(Serialize)]
struct InputInfo {
    name: String,
    input_type: String,
    capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &EventboxConfig) -> ConfigInfo {
    let retry = &config.dispatcher.retry;

    ConfigInfo {
        version: format!("{:?}", config.version),
        default_pool_size: config.dispatcher.default_pool_size,
        retry: RetryInfo {
            retries: retry.retries,
            max_jitter_ms: retry.max_jitter_ms,
            backoff_factor: retry.backoff_factor,
        },
        backends: config
            .backends
            .iter()
            .map(|b| BackendInfo {
                name: b.name.clone(),
                backend_type: format!("{:?}", b.backend_type),
                pool_size: config.pool_size_for(&b.name),
                params: b.params.clone().into_iter().collect(),
            })
            .collect(),
        inputs: config
            .inputs
            .iter()
            .map(|i| InputInfo {
                name: i.name.clone(),
                input_type: format!("{:?}", i.input_type),
                capacity: i.capacity,
            })
            .collect(),
    }
}

fn tree_prefix(index: usize, len: usize) -> &'static str {
    if index + 1 == len {
        "└─"
    } else {
        "├─"
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 Eventbox Configuration                       ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Dispatcher");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Default pool size: {}", info.default_pool_size);
    println!("   └─ Retry");
    println!("      ├─ Retries: {}", info.retry.retries);
    println!("      ├─ Max jitter: {}ms", info.retry.max_jitter_ms);
    println!("      └─ Backoff factor: {}", info.retry.backoff_factor);

    println!("\n📮 Backends ({})", info.backends.len());
    for (i, backend) in info.backends.iter().enumerate() {
        let prefix = tree_prefix(i, info.backends.len());
        println!(
            "   {} {} ({}, pool {})",
            prefix, backend.name, backend.backend_type, backend.pool_size
        );
        if let Some(path) = backend.params.get("path") {
            let child_prefix = if i + 1 == info.backends.len() {
                "   "
            } else {
                "│  "
            };
            println!("   {}  └─ path: {}", child_prefix, path);
        }
    }

    println!("\n📥 Inputs ({})", info.inputs.len());
    for (i, input) in info.inputs.iter().enumerate() {
        println!(
            "   {} {} ({}, capacity {})",
            tree_prefix(i, info.inputs.len()),
            input.name,
            input.input_type,
            input.capacity
        );
    }

    println!();
}
