//! RegisteredLabelFilter - expands registry references into concrete labels
//!
//! A message may carry the reserved label [`REGISTERED_LABEL`] whose value is
//! a registry key (or a list of keys). Each key is resolved as a prefix
//! against the [`LabelRegistry`] and every matched label set is merged into
//! the message:
//!
//! - labels already on the message are kept;
//! - when both sides are JSON arrays, new items are appended without duplicates;
//! - the reserved label itself is removed.
//!
//! A key that resolves to nothing aborts the chain.

use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use contracts::{DispatchError, Filter, FilterError, Labels, Message, Value};

use super::registry::LabelRegistry;

/// Reserved label key referencing registry entries
pub const REGISTERED_LABEL: &str = "REGISTERED_LABEL";

const FILTER_NAME: &str = "registered_label";

pub struct RegisteredLabelFilter {
    registry: Arc<dyn LabelRegistry>,
}

impl RegisteredLabelFilter {
    pub fn new(registry: Arc<dyn LabelRegistry>) -> Self {
        Self { registry }
    }

    fn reject(outcome: &mut DispatchError, message: impl Into<String>) {
        outcome.set_filtered(FILTER_NAME, FilterError::new(FILTER_NAME, message));
    }
}

/// Registry keys named by the reserved label value
fn registry_keys(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(key) => Some(vec![key.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn merge_labels(target: &mut Labels, incoming: Labels) {
    for (key, value) in incoming {
        match target.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => {
                if let (Value::Array(existing), Value::Array(items)) = (slot.get_mut(), value) {
                    for item in items {
                        if !existing.contains(&item) {
                            existing.push(item);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Filter for RegisteredLabelFilter {
    fn name(&self) -> &str {
        FILTER_NAME
    }

    #[instrument(
        name = "registered_label_filter",
        skip(self, msg, outcome),
        fields(sender = %msg.sender)
    )]
    async fn filter(&self, msg: &mut Message, outcome: &mut DispatchError) {
        let Some(reference) = msg.labels.remove(REGISTERED_LABEL) else {
            return;
        };

        let Some(keys) = registry_keys(&reference) else {
            warn!(value = %reference, "Registered label is not a key or list of keys");
            return Self::reject(
                outcome,
                format!("{REGISTERED_LABEL} must be a string or a list of strings"),
            );
        };

        for key in keys {
            let entries = match self.registry.prefix_get(&key).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(key = %key, error = %e, "Registry lookup failed");
                    let reason = format!("registry lookup for '{key}' failed: {e}");
                    return Self::reject(outcome, reason);
                }
            };
            if entries.is_empty() {
                return Self::reject(outcome, format!("no registered labels under '{key}'"));
            }

            debug!(key = %key, entries = entries.len(), "Registered labels resolved");
            for (_, labels) in entries {
                merge_labels(&mut msg.labels, labels);
            }
        }
    }
}
