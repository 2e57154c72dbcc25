//! Counter store on top of durable per-identity records.
//!
//! The application keeps usage counters as two fields on each user record.
//! [`IdentityStore`] is the narrow view of that record source the limiter
//! needs; [`DurableCounterStore`] adapts it to [`CounterStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{CounterStore, StoreError};
use crate::ratelimit::CounterRecord;

/// Usage fields stored on an identity's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub count: u64,
    pub reset_at: Option<i64>,
}

impl From<UsageRecord> for CounterRecord {
    fn from(record: UsageRecord) -> Self {
        CounterRecord {
            count: record.count,
            reset_at: record.reset_at,
        }
    }
}

impl From<CounterRecord> for UsageRecord {
    fn from(record: CounterRecord) -> Self {
        UsageRecord {
            count: record.count,
            reset_at: record.reset_at,
        }
    }
}

/// Durable source of per-identity usage records.
///
/// `find_by_identity` returns `None` when the identity itself does not exist.
/// An identity that has never been rate limited exists with a default record.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_identity(&self, id: &str) -> Result<Option<UsageRecord>, StoreError>;

    async fn update_by_identity(&self, id: &str, record: UsageRecord) -> Result<(), StoreError>;

    /// Add one to the identity's count and return the new value.
    ///
    /// The default reads then writes. Stores with an atomic increment should
    /// override it.
    async fn increment_count(&self, id: &str) -> Result<u64, StoreError> {
        let mut record = self
            .find_by_identity(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.count += 1;
        self.update_by_identity(id, record).await?;
        Ok(record.count)
    }
}

#[async_trait]
impl<T: IdentityStore + ?Sized> IdentityStore for Arc<T> {
    async fn find_by_identity(&self, id: &str) -> Result<Option<UsageRecord>, StoreError> {
        (**self).find_by_identity(id).await
    }

    async fn update_by_identity(&self, id: &str, record: UsageRecord) -> Result<(), StoreError> {
        (**self).update_by_identity(id, record).await
    }

    async fn increment_count(&self, id: &str) -> Result<u64, StoreError> {
        (**self).increment_count(id).await
    }
}

/// [`CounterStore`] keyed by identity, persisted through an [`IdentityStore`].
///
/// Policy-agnostic: the caller picks `{limit, window}` per tier.
#[derive(Debug)]
pub struct DurableCounterStore<I> {
    identities: I,
}

impl<I: IdentityStore> DurableCounterStore<I> {
    pub fn new(identities: I) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &I {
        &self.identities
    }
}

#[async_trait]
impl<I: IdentityStore> CounterStore for DurableCounterStore<I> {
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, StoreError> {
        match self.identities.find_by_identity(key).await? {
            Some(record) => Ok(Some(record.into())),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn set_reset(&self, key: &str, record: CounterRecord) -> Result<(), StoreError> {
        trace!(identity = %key, count = record.count, reset_at = ?record.reset_at, "Resetting usage window");
        self.identities.update_by_identity(key, record.into()).await
    }

    async fn increment(&self, key: &str) -> Result<u64, StoreError> {
        self.identities.increment_count(key).await
    }
}

/// In-process [`IdentityStore`].
///
/// Identities must be registered before use. The store can be switched
/// offline to exercise outage handling.
#[derive(Debug)]
pub struct MemoryIdentityStore {
    records: RwLock<HashMap<String, UsageRecord>>,
    available: AtomicBool,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Create an identity with an unused record. Existing records are kept.
    pub fn register(&self, id: &str) {
        self.records.write().entry(id.to_string()).or_default();
    }

    /// Current record for an identity, bypassing availability.
    pub fn record(&self, id: &str) -> Option<UsageRecord> {
        self.records.read().get(id).copied()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("identity store offline".to_string()))
        }
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_identity(&self, id: &str) -> Result<Option<UsageRecord>, StoreError> {
        self.ensure_available()?;
        Ok(self.records.read().get(id).copied())
    }

    async fn update_by_identity(&self, id: &str, record: UsageRecord) -> Result<(), StoreError> {
        self.ensure_available()?;
        match self.records.write().get_mut(id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn increment_count(&self, id: &str) -> Result<u64, StoreError> {
        self.ensure_available()?;
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.count += 1;
        Ok(record.count)
    }
}
