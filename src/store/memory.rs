//! In-memory settings store

use super::{SettingsRecord, SettingsStore, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Process-local store; used when no file path is configured and in tests
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, SettingsRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(agent_id: &str, record: SettingsRecord) -> Self {
        let mut records = HashMap::new();
        records.insert(agent_id.to_string(), record);
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self, agent_id: &str) -> Result<Option<SettingsRecord>, StoreError> {
        Ok(self.records.read().await.get(agent_id).cloned())
    }

    async fn save(&self, agent_id: &str, record: &SettingsRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(agent_id.to_string(), record.clone());
        Ok(())
    }
}
