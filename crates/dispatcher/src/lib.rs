//! # Dispatcher
//!
//! Message fan-out core.
//!
//! Responsibilities:
//! - run the ordered filter chain for every message an Input hands over
//! - fan out to every labelled backend through that backend's worker pool
//! - isolate failing or slow backends from each other
//! - own the start/stop lifecycle of inputs and pools

pub mod backends;
pub mod dispatcher;
pub mod error;
pub mod fanout;
pub mod filters;
pub mod metrics;
pub mod retry;
pub mod router;

pub use backends::{create_backend, FileBackend, LogBackend};
pub use dispatcher::{BackendStatus, Dispatcher, DispatcherBuilder, DispatcherState};
pub use error::DispatcherError;
pub use fanout::FanOutFilter;
pub use filters::{
    LabelRegistry, MemoryRegistry, RegisteredLabelFilter, RegistryError, REGISTERED_LABEL,
};
pub use metrics::{BackendMetrics, MetricsSnapshot};
pub use retry::RetryPolicy;
pub use router::Router;
