use std::collections::HashMap;

use async_trait::async_trait;
use taskmon_core::{models::PeriodicScheduleEntry, traits::ScheduleStore, Result};
use tokio::sync::RwLock;
use tracing::debug;

/// 周期任务存储的默认内存实现
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    entries: RwLock<HashMap<String, PeriodicScheduleEntry>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn upsert(&self, entry: &PeriodicScheduleEntry) -> Result<()> {
        let previous = self
            .entries
            .write()
            .await
            .insert(entry.name.clone(), entry.clone());
        debug!(
            "{}周期任务: {}",
            if previous.is_some() { "更新" } else { "新建" },
            entry.name
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<PeriodicScheduleEntry>> {
        Ok(self.entries.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<PeriodicScheduleEntry>> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(name).is_some())
    }
}
