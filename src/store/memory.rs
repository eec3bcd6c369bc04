//! Process-local store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{StoreError, UsageStore};
use crate::usage::DestinationRecord;

/// Store that keeps counts in memory only. Counts are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counts: Mutex<HashMap<u32, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = DestinationRecord>) -> Self {
        let counts = records
            .into_iter()
            .map(|r| (r.identifier, r.count))
            .collect();
        Self {
            counts: Mutex::new(counts),
        }
    }

    /// Stored count for `identifier`.
    pub fn count(&self, identifier: u32) -> Option<u64> {
        self.counts
            .lock()
            .expect("memory store mutex poisoned")
            .get(&identifier)
            .copied()
    }
}

#[async_trait]
impl UsageStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<DestinationRecord>, StoreError> {
        let counts = self.counts.lock().expect("memory store mutex poisoned");
        Ok(counts
            .iter()
            .map(|(&identifier, &count)| DestinationRecord::new(identifier, count))
            .collect())
    }

    async fn upsert_count(&self, identifier: u32, count: u64) -> Result<(), StoreError> {
        let mut counts = self.counts.lock().expect("memory store mutex poisoned");
        let stored = counts.entry(identifier).or_insert(count);
        *stored = (*stored).max(count);
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_keeps_highest_count() {
        let store = MemoryStore::with_records([DestinationRecord::new(8080, 3)]);

        store.upsert_count(8080, 7).await.unwrap();
        store.upsert_count(8080, 5).await.unwrap();
        store.upsert_count(8080, 7).await.unwrap();

        assert_eq!(store.count(8080), Some(7));
        assert_eq!(store.load_all().await.unwrap(), vec![DestinationRecord::new(8080, 7)]);
    }

    #[tokio::test]
    async fn upsert_creates_missing_record() {
        let store = MemoryStore::new();
        store.upsert_count(9000, 0).await.unwrap();
        assert_eq!(store.count(9000), Some(0));
    }
}
