//! # Contracts
//!
//! Frozen interface contracts shared by every eventbox crate: the message
//! model, the dispatch outcome, the error taxonomy, the collaborator traits
//! and the configuration model.
//! Business crates depend only on this crate, never the reverse.
//!
//! ## Time Model
//! - `Message::time` is epoch milliseconds, stamped by the producing Input

mod backend;
mod config;
mod dispatch;
mod error;
mod filter;
mod input;
mod label_key;
mod message;

pub use backend::Backend;
pub use config::*;
pub use dispatch::DispatchError;
pub use error::*;
pub use filter::Filter;
pub use input::{Input, MessageHandler};
pub use label_key::LabelKey;
pub use message::{CreateHistory, Labels, Message};

/// Re-exported so implementors share the same JSON value type
pub use serde_json::Value;
