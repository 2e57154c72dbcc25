//! Counter stores.
//!
//! Two kinds of store back the limiters:
//!
//! - [`CounterStore`] holds `count`/`reset_at` records and leaves the decision
//!   to the caller. Implemented by the in-process [`MemoryCounterStore`] and by
//!   [`DurableCounterStore`], which sits on the application's user records.
//! - [`SharedCounter`] is a fast external service that runs its own sliding
//!   window and answers with a finished [`LimitResult`]. Implemented by
//!   [`RedisSharedCounter`].

mod durable;
mod memory;
mod shared;

pub use durable::{DurableCounterStore, IdentityStore, MemoryIdentityStore, UsageRecord};
pub use memory::MemoryCounterStore;
pub use shared::{bucket_position, RedisSharedCounter, SharedStoreConfig};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::ratelimit::{CounterRecord, LimitResult};

/// Errors raised by counter stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The identity the counter belongs to does not exist
    #[error("unknown identity: {0}")]
    NotFound(String),

    /// Redis client errors
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Storage for per-key counter records.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Fetch the record for `key`, `None` if it was never written.
    async fn get(&self, key: &str) -> Result<Option<CounterRecord>, StoreError>;

    /// Overwrite the record for `key` with a new window.
    async fn set_reset(&self, key: &str, record: CounterRecord) -> Result<(), StoreError>;

    /// Add one to the stored count and return the new value.
    async fn increment(&self, key: &str) -> Result<u64, StoreError>;
}

/// A low-latency counting service that evaluates limits itself.
#[async_trait]
pub trait SharedCounter: Send + Sync {
    async fn evaluate(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<LimitResult, StoreError>;
}

#[async_trait]
impl<T: SharedCounter + ?Sized> SharedCounter for std::sync::Arc<T> {
    async fn evaluate(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<LimitResult, StoreError> {
        (**self).evaluate(key, limit, window).await
    }
}
