//! # Inputs
//!
//! Built-in transport adapters feeding the dispatcher.
//!
//! Responsibilities:
//! - Accept messages from a transport (in-process channel, JSON lines)
//! - Hand every message to the routing handler
//! - Stop on request, finishing in-flight dispatches first
//!
//! ## Usage Example
//!
//! ```ignore
//! use inputs::ChannelInput;
//!
//! let input = Arc::new(ChannelInput::new("api", 100));
//! let handle = input.handle();
//!
//! let dispatcher = DispatcherBuilder::new(settings)
//!     .register_input(input)
//!     .build();
//!
//! let outcome = handle.send(msg).await?;
//! ```

mod channel;
mod error;
mod lines;
mod metrics;

use std::sync::Arc;

use contracts::{Input, InputConfig, InputType};

pub use channel::{ChannelInput, ChannelInputHandle};
pub use error::{InputError, Result};
pub use lines::LinesInput;
pub use metrics::{InputMetrics, MetricsSnapshot};

/// Create an input from configuration
///
/// Channel inputs built this way have no external producer; keep the
/// concrete [`ChannelInput`] when a handle is needed.
pub fn create_input(config: &InputConfig) -> Arc<dyn Input> {
    match config.input_type {
        InputType::Stdin => Arc::new(LinesInput::stdin(&config.name)),
        InputType::Channel => Arc::new(ChannelInput::new(&config.name, config.capacity)),
    }
}
