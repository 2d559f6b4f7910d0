//! Dispatcher error types

use thiserror::Error;

use crate::dispatcher::DispatcherState;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Two backends registered under one name
    #[error("backend '{name}' is already registered")]
    DuplicateBackend { name: String },

    /// Lifecycle operation called in the wrong state
    #[error("cannot {operation} dispatcher in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: DispatcherState,
    },

    /// Backend construction from configuration failed
    #[error("failed to create backend '{name}': {message}")]
    BackendCreation { name: String, message: String },

    /// One or more inputs returned an error from their run loop
    #[error("inputs failed: {}", failures.join("; "))]
    Inputs { failures: Vec<String> },

    /// Stopping inputs or pools reported failures
    #[error("shutdown incomplete: {}", failures.join("; "))]
    Shutdown { failures: Vec<String> },

    /// A backend pool refused to start
    #[error("pool error: {0}")]
    Pool(#[from] worker_pool::PoolError),

    /// Contract error
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a backend creation error
    pub fn backend_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
