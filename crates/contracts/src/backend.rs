//! Backend trait - delivery channel interface
//!
//! Concrete channels (email, SMS, voice, webhook, chat bots) implement this
//! trait. A backend is addressed by a message label whose key equals
//! [`Backend::name`].

use async_trait::async_trait;
use serde_json::Value;

use crate::{DeliveryError, Message};

/// Delivery backend (subscriber)
///
/// `publish` runs on the backend's worker pool, possibly many times
/// concurrently, so implementations take `&self`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name, also the label key that routes to it
    fn name(&self) -> &str;

    /// Deliver one message
    ///
    /// # Arguments
    /// * `destination` - JSON-encoded label value
    /// * `content` - JSON-encoded message content
    /// * `timestamp` - message time (epoch millis)
    /// * `msg` - the full message, for backends that need labels or history
    ///
    /// Returns every failure; an empty list means success.
    async fn publish(
        &self,
        destination: &str,
        content: &str,
        timestamp: i64,
        msg: &Message,
    ) -> Vec<DeliveryError>;

    /// Backend-defined status document
    fn status(&self) -> Value {
        Value::Null
    }
}
