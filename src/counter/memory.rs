use super::FastCounterStore;
use crate::core::{CounterKey, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local counter store
///
/// Suitable for single-instance deployments and tests. Counters vanish with
/// the process, which the engine tolerates.
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: RwLock<HashMap<String, u64>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a counter value
    pub async fn set(&self, key: &CounterKey, value: u64) {
        let mut counters = self.counters.write().await;
        counters.insert(key.as_str().to_string(), value);
    }

    /// Number of keys ever touched
    pub async fn len(&self) -> usize {
        self.counters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.counters.read().await.is_empty()
    }
}

#[async_trait]
impl FastCounterStore for MemoryCounterStore {
    async fn get(&self, key: &CounterKey) -> Result<u64> {
        let counters = self.counters.read().await;
        Ok(counters.get(key.as_str()).copied().unwrap_or(0))
    }

    async fn increment(&self, key: &CounterKey) -> Result<()> {
        let mut counters = self.counters.write().await;
        let entry = counters.entry(key.as_str().to_string()).or_insert(0);
        *entry = entry.saturating_add(1);
        Ok(())
    }

    async fn reset(&self, key: &CounterKey) -> Result<()> {
        let mut counters = self.counters.write().await;
        if let Some(value) = counters.get_mut(key.as_str()) {
            *value = 0;
        }
        Ok(())
    }
}
