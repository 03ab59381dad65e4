use async_trait::async_trait;
use dashmap::DashMap;

use crate::models::{ContentId, ProgressKey, ProgressRecord};
use crate::Result;

/// Persistence for playback positions, one record per content item
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get_progress(
        &self,
        content_type: &str,
        content_id: &ContentId,
    ) -> Result<Option<ProgressRecord>>;

    async fn save_progress(&self, record: &ProgressRecord) -> Result<()>;

    async fn remove_progress(&self, content_type: &str, content_id: &ContentId) -> Result<()>;
}

/// In-process store for tests and single-node deployments
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: DashMap<ProgressKey, ProgressRecord>,
}

impl MemoryProgressStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn get_progress(
        &self,
        content_type: &str,
        content_id: &ContentId,
    ) -> Result<Option<ProgressRecord>> {
        let key = ProgressKey::new(content_type.to_string(), content_id.clone());
        Ok(self.records.get(&key).map(|r| r.value().clone()))
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<()> {
        self.records.insert(record.key(), record.clone());
        Ok(())
    }

    async fn remove_progress(&self, content_type: &str, content_id: &ContentId) -> Result<()> {
        let key = ProgressKey::new(content_type.to_string(), content_id.clone());
        self.records.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryProgressStore::new();
        let id = ContentId::from("m1");

        assert!(store.get_progress("movie", &id).await.unwrap().is_none());

        store
            .save_progress(&ProgressRecord::new(id.clone(), "movie", 30.0, 100.0))
            .await
            .unwrap();
        let loaded = store.get_progress("movie", &id).await.unwrap().unwrap();
        assert_eq!(loaded.position_seconds, 30.0);

        // Same id under a different content type is a different record
        assert!(store.get_progress("series", &id).await.unwrap().is_none());

        store.remove_progress("movie", &id).await.unwrap();
        assert!(store.is_empty());
    }
}
