//! Message - the unit flowing from Inputs through filters to backends
//!
//! ## Content contract
//! `content` and label values are JSON values. Each backend declares the
//! shape it expects; the fan-out only guarantees JSON marshaling of both into
//! the strings handed to [`Backend::publish`](crate::Backend::publish).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::LabelKey;

/// Label set attached to a message: backend name -> delivery parameters
pub type Labels = HashMap<LabelKey, Value>;

/// Audit record created alongside a message by the producing system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateHistory {
    /// Record id in the producer's history store
    #[serde(default)]
    pub id: Option<u64>,

    /// Producer of the message
    #[serde(default)]
    pub sender: String,

    /// Creation time (epoch millis)
    pub created_at: i64,

    /// Producer-defined status string
    #[serde(default)]
    pub status: String,
}

/// Notification message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message
    #[serde(default)]
    pub sender: String,

    /// Backend-interpreted payload
    #[serde(default)]
    pub content: Value,

    /// Delivery instructions, keyed by backend name
    #[serde(default)]
    pub labels: Labels,

    /// Creation time (epoch millis)
    #[serde(default = "now_millis")]
    pub time: i64,

    /// Optional audit record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_history: Option<CreateHistory>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Message {
    /// Create a message stamped with the current time and no labels
    pub fn new(sender: impl Into<String>, content: impl Into<Value>) -> Self {
        Self {
            sender: sender.into(),
            content: content.into(),
            labels: Labels::new(),
            time: now_millis(),
            create_history: None,
        }
    }

    /// Attach (or replace) a label
    pub fn with_label(mut self, key: impl Into<LabelKey>, value: impl Into<Value>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Override the message time
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    /// Attach an audit record
    pub fn with_create_history(mut self, history: CreateHistory) -> Self {
        self.create_history = Some(history);
        self
    }

    /// Check whether a label is present
    pub fn has_label(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }
}
