//! LogBackend - logs each publication via tracing

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use contracts::{Backend, DeliveryError, Message, Value};
use serde_json::json;
use tracing::{info, instrument};

/// Backend that logs publications and always succeeds
pub struct LogBackend {
    name: String,
    published: AtomicU64,
}

impl LogBackend {
    /// Create a new LogBackend with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            published: AtomicU64::new(0),
        }
    }

    /// Publications logged so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for LogBackend {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_backend_publish",
        skip(self, content, msg),
        fields(backend = %self.name, sender = %msg.sender)
    )]
    async fn publish(
        &self,
        destination: &str,
        content: &str,
        timestamp: i64,
        msg: &Message,
    ) -> Vec<DeliveryError> {
        self.published.fetch_add(1, Ordering::Relaxed);
        info!(
            backend = %self.name,
            destination,
            content,
            timestamp,
            labels = msg.labels.len(),
            "Message published"
        );
        Vec::new()
    }

    fn status(&self) -> Value {
        json!({ "type": "log", "published": self.published() })
    }
}
