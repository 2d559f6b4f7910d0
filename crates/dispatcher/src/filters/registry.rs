//! LabelRegistry - named label sets that messages can reference

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use contracts::Labels;
use tokio::sync::RwLock;

/// Error reported by a registry store
pub type RegistryError = Box<dyn std::error::Error + Send + Sync>;

/// Store of label sets keyed by hierarchical names (`team/ops/oncall`)
#[async_trait]
pub trait LabelRegistry: Send + Sync {
    /// Store `labels` under `key`, returning the previous set
    async fn put(&self, key: &str, labels: Labels) -> Result<Option<Labels>, RegistryError>;

    /// Every entry whose key starts with `prefix`, ordered by key
    async fn prefix_get(&self, prefix: &str) -> Result<BTreeMap<String, Labels>, RegistryError>;

    /// Remove `key`, returning its set
    async fn del(&self, key: &str) -> Result<Option<Labels>, RegistryError>;
}

/// In-memory registry
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    entries: RwLock<BTreeMap<String, Labels>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl LabelRegistry for MemoryRegistry {
    async fn put(&self, key: &str, labels: Labels) -> Result<Option<Labels>, RegistryError> {
        Ok(self.entries.write().await.insert(key.to_string(), labels))
    }

    async fn prefix_get(&self, prefix: &str) -> Result<BTreeMap<String, Labels>, RegistryError> {
        let entries = self.entries.read().await;
        let matched = entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, labels)| (key.clone(), labels.clone()))
            .collect();
        Ok(matched)
    }

    async fn del(&self, key: &str) -> Result<Option<Labels>, RegistryError> {
        Ok(self.entries.write().await.remove(key))
    }
}
