//! Built-in backends
//!
//! Contains LogBackend and FileBackend, plus the factory used by the CLI to
//! build backends from configuration.

mod file;
mod log;

use std::sync::Arc;

use contracts::{Backend, BackendConfig, BackendType};
use tracing::instrument;

use crate::error::DispatcherError;

pub use self::file::FileBackend;
pub use self::log::LogBackend;

/// Create a backend from configuration
#[instrument(
    name = "dispatcher_create_backend",
    skip(config),
    fields(backend = %config.name, backend_type = ?config.backend_type)
)]
pub async fn create_backend(config: &BackendConfig) -> Result<Arc<dyn Backend>, DispatcherError> {
    match config.backend_type {
        BackendType::Log => Ok(Arc::new(LogBackend::new(&config.name))),
        BackendType::File => {
            let backend = FileBackend::from_params(&config.name, &config.params)
                .await
                .map_err(|e| DispatcherError::backend_creation(&config.name, e.to_string()))?;
            Ok(Arc::new(backend))
        }
    }
}
