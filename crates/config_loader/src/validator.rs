//! Configuration validation
//!
//! Rules:
//! - backend names non-empty and unique
//! - pool sizes > 0
//! - `file` backends carry `params.path`
//! - retry: `backoff_factor >= 1.0`, `max_jitter_ms` sub-second
//! - input names non-empty and unique

use std::collections::HashSet;

use contracts::{BackendType, ContractError, EventboxConfig};

/// Upper bound (exclusive) of the retry jitter
pub const MAX_JITTER_MS: u64 = 1000;

/// Validate an EventboxConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &EventboxConfig) -> Result<(), ContractError> {
    validate_backend_names(config)?;
    validate_pool_sizes(config)?;
    validate_backend_params(config)?;
    validate_retry(config)?;
    validate_inputs(config)?;
    Ok(())
}

/// Non-fatal observations about a valid configuration
pub fn warnings(config: &EventboxConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.backends.is_empty() {
        warnings.push("no backends configured: every message will be a no-op".to_string());
    }
    if config.inputs.is_empty() {
        warnings.push("no inputs configured: nothing will feed the dispatcher".to_string());
    }
    let configured: HashSet<&str> = config.backends.iter().map(|b| b.name.as_str()).collect();
    for name in config.dispatcher.pool_sizes.keys() {
        if !configured.contains(name.as_str()) {
            warnings.push(format!(
                "dispatcher.pool_sizes.{name} does not match a configured backend"
            ));
        }
    }
    warnings.sort();
    warnings
}

fn validate_backend_names(config: &EventboxConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, backend) in config.backends.iter().enumerate() {
        if backend.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("backends[{idx}].name"),
                "backend name cannot be empty",
            ));
        }
        if !seen.insert(&backend.name) {
            return Err(ContractError::config_validation(
                format!("backends[name={}]", backend.name),
                "duplicate backend name",
            ));
        }
    }
    Ok(())
}

fn validate_pool_sizes(config: &EventboxConfig) -> Result<(), ContractError> {
    if config.dispatcher.default_pool_size == 0 {
        return Err(ContractError::config_validation(
            "dispatcher.default_pool_size",
            "pool size must be > 0",
        ));
    }
    for (name, size) in &config.dispatcher.pool_sizes {
        if *size == 0 {
            return Err(ContractError::config_validation(
                format!("dispatcher.pool_sizes.{name}"),
                "pool size must be > 0",
            ));
        }
    }
    for backend in &config.backends {
        if backend.pool_size == Some(0) {
            return Err(ContractError::config_validation(
                format!("backends[{}].pool_size", backend.name),
                "pool size must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_backend_params(config: &EventboxConfig) -> Result<(), ContractError> {
    for backend in &config.backends {
        if backend.backend_type == BackendType::File
            && backend.params.get("path").is_none_or(|p| p.is_empty())
        {
            return Err(ContractError::config_validation(
                format!("backends[{}].params.path", backend.name),
                "file backend requires a path",
            ));
        }
    }
    Ok(())
}

fn validate_retry(config: &EventboxConfig) -> Result<(), ContractError> {
    let retry = &config.dispatcher.retry;
    if retry.backoff_factor.is_nan() || retry.backoff_factor < 1.0 {
        return Err(ContractError::config_validation(
            "dispatcher.retry.backoff_factor",
            format!("backoff_factor must be >= 1.0, got {}", retry.backoff_factor),
        ));
    }
    if retry.max_jitter_ms >= MAX_JITTER_MS {
        return Err(ContractError::config_validation(
            "dispatcher.retry.max_jitter_ms",
            format!(
                "max_jitter_ms must be < {MAX_JITTER_MS}, got {}",
                retry.max_jitter_ms
            ),
        ));
    }
    Ok(())
}

fn validate_inputs(config: &EventboxConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, input) in config.inputs.iter().enumerate() {
        if input.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("inputs[{idx}].name"),
                "input name cannot be empty",
            ));
        }
        if !seen.insert(&input.name) {
            return Err(ContractError::config_validation(
                format!("inputs[name={}]", input.name),
                "duplicate input name",
            ));
        }
    }
    Ok(())
}
