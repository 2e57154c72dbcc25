//! In-process counter store.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{CounterStore, StoreError};
use crate::ratelimit::CounterRecord;

/// Counter records kept in a concurrent map for the life of the process.
///
/// Entries are never evicted; expired records are overwritten on the next
/// access to the same key.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    records: DashMap<String, CounterRecord>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys that have been seen.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.clear();
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        Ok(self.records.get(key).map(|entry| *entry.value()))
    }

    async fn set_reset(&self, key: &str, record: CounterRecord) -> Result<(), StoreError> {
        self.records.insert(key.to_string(), record);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        let mut entry = self.records.entry(key.to_string()).or_default();
        entry.count += 1;
        Ok(entry.count)
    }
}
