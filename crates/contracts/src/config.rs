//! EventboxConfig - Config Loader output
//!
//! Describes the dispatcher tuning, the backends to register, and the inputs
//! to serve.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete eventbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventboxConfig {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Dispatcher tuning
    #[serde(default)]
    pub dispatcher: DispatcherSettings,

    /// Backends to register
    #[serde(default)]
    pub backends: Vec<BackendConfig>,

    /// Inputs to serve
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
}

impl EventboxConfig {
    /// Pool capacity for a backend: its own override, then the dispatcher map,
    /// else the default
    pub fn pool_size_for(&self, backend: &str) -> usize {
        self.backends
            .iter()
            .find(|b| b.name == backend)
            .and_then(|b| b.pool_size)
            .unwrap_or_else(|| self.dispatcher.pool_size_for(backend))
    }

    /// Dispatcher settings with every backend override folded into `pool_sizes`
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        let mut settings = self.dispatcher.clone();
        for backend in &self.backends {
            if let Some(size) = backend.pool_size {
                settings.pool_sizes.insert(backend.name.clone(), size);
            }
        }
        settings
    }
}

/// Dispatcher tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSettings {
    /// Capacity of each backend's worker pool
    #[serde(default = "default_pool_size")]
    pub default_pool_size: usize,

    /// Retry policy for submissions to a full pool
    #[serde(default)]
    pub retry: RetrySettings,

    /// Per-backend pool capacity overrides (by backend name)
    #[serde(default)]
    pub pool_sizes: HashMap<String, usize>,
}

impl DispatcherSettings {
    /// Capacity for a backend registered outside the `backends` list
    pub fn pool_size_for(&self, backend: &str) -> usize {
        self.pool_sizes
            .get(backend)
            .copied()
            .unwrap_or(self.default_pool_size)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            default_pool_size: default_pool_size(),
            retry: RetrySettings::default(),
            pool_sizes: HashMap::new(),
        }
    }
}

fn default_pool_size() -> usize {
    100
}

/// Retry settings for a full pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Extra submit attempts after the first one fails
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Upper bound of the random delay before a retry (milliseconds)
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Multiplier applied to the jitter bound on each further attempt
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            max_jitter_ms: default_max_jitter_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

fn default_retries() -> u32 {
    1
}

fn default_max_jitter_ms() -> u64 {
    500
}

fn default_backoff_factor() -> f64 {
    1.0
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend name (label key that routes to it)
    pub name: String,

    /// Backend type
    pub backend_type: BackendType,

    /// Pool capacity override
    #[serde(default)]
    pub pool_size: Option<usize>,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Built-in backend types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Log each publication
    Log,
    /// Append JSON lines to a file
    File,
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Input name
    pub name: String,

    /// Input type
    pub input_type: InputType,

    /// Queue capacity (channel inputs)
    #[serde(default = "default_input_capacity")]
    pub capacity: usize,
}

fn default_input_capacity() -> usize {
    100
}

/// Built-in input types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// Newline-delimited JSON messages on stdin
    Stdin,
    /// In-process channel
    Channel,
}
