//! Layered error definitions
//!
//! Categorized by scope: config / input / delivery (backend-scoped) / filter

use thiserror::Error;

/// Unified error type for configuration and input lifecycle
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Input Errors =====
    /// Input failed while running or stopping
    #[error("input '{input}' error: {message}")]
    Input { input: String, message: String },

    /// Input started twice
    #[error("input '{input}' is already running")]
    InputAlreadyRunning { input: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create input error
    pub fn input(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Input {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// Backend-scoped delivery error
///
/// Recorded under the backend's name in
/// [`DispatchError::backend_errs`](crate::DispatchError). Never aborts other
/// backends' deliveries.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Backend rejected or failed the publication
    #[error("{message}")]
    Publish { message: String },

    /// Backend failure carrying the underlying error
    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync>),

    /// Pool stayed full through every submit attempt
    #[error("no idle worker for backend '{backend}' after {attempts} attempts")]
    PoolExhausted { backend: String, attempts: u32 },

    /// No worker became idle in time
    #[error("timed out waiting for an idle worker of backend '{backend}'")]
    PoolTimeout { backend: String },

    /// Submission outside the pool's start/stop window
    #[error("worker pool of backend '{backend}' is not running")]
    PoolNotRunning { backend: String },

    /// Delivery task ended without reporting (panicked)
    #[error("delivery task for backend '{backend}' aborted before reporting")]
    TaskAborted { backend: String },

    /// Content or destination could not be marshaled
    #[error("failed to encode {what} for backend '{backend}': {message}")]
    Encode {
        backend: String,
        what: &'static str,
        message: String,
    },
}

impl DeliveryError {
    /// Create a publish error from a message
    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Wrap an arbitrary backend error
    pub fn source(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Source(Box::new(err))
    }

    /// True for errors raised by pool capacity rather than the backend itself
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::PoolExhausted { .. } | Self::PoolTimeout { .. })
    }
}

/// Error set by a non-terminal filter to abort the chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("filter '{filter}' rejected message: {message}")]
pub struct FilterError {
    /// Name of the aborting filter
    pub filter: String,
    /// Reason
    pub message: String,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_error_displays_bare_message() {
        assert_eq!(DeliveryError::publish("smtp 550").to_string(), "smtp 550");
    }

    #[test]
    fn test_source_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(DeliveryError::source(io).to_string(), "refused");
    }

    #[test]
    fn test_capacity_classification() {
        let exhausted = DeliveryError::PoolExhausted {
            backend: "SMS".into(),
            attempts: 2,
        };
        assert!(exhausted.is_capacity());
        assert!(!DeliveryError::publish("x").is_capacity());
    }
}
