//! Store-backed quota manager.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::backend::QuotaBackend;
use super::counter::{CounterRecord, LimitResult, UsageSnapshot, WindowState};
use super::policy::RateLimitPolicy;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::{CounterStore, StoreError};

/// Evaluates fixed-window quotas against a [`CounterStore`].
///
/// Windows reset lazily: a record whose `reset_at` has passed is treated as
/// empty on the next check and overwritten with a new window. Denied requests
/// do not consume quota.
///
/// The read and the following write are separate store calls, so concurrent
/// checks for one key may both be admitted on the last unit of quota.
pub struct QuotaManager<S> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: CounterStore> QuotaManager<S> {
    /// Create a quota manager using the system clock.
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Check the quota for `key` and consume one unit if it is available.
    ///
    /// An identity unknown to the store is denied with a reset one window
    /// from now. Any other store failure is returned to the caller.
    pub async fn check_and_consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<LimitResult> {
        let now = self.clock.now_millis();

        let record = match self.store.get(key).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                debug!(key = %key, "No record for identity, denying");
                return Ok(LimitResult::denied(now.saturating_add(policy.window_millis())));
            }
            Err(e) => return Err(e.into()),
        };

        let state = WindowState::of(record.as_ref(), now, policy);
        let reset_at = state.reset_at();

        trace!(
            key = %key,
            count = state.count(),
            limit = policy.limit(),
            expired = state.is_expired(),
            "Checking quota"
        );

        if state.count() >= policy.limit() {
            if state.is_expired() {
                self.store.set_reset(key, CounterRecord::new(0, reset_at)).await?;
            }
            debug!(
                key = %key,
                count = state.count(),
                limit = policy.limit(),
                "Quota exceeded"
            );
            return Ok(LimitResult::denied(reset_at));
        }

        let count = if state.is_expired() {
            debug!(key = %key, reset_at = reset_at, "Starting new window");
            self.store.set_reset(key, CounterRecord::new(1, reset_at)).await?;
            1
        } else {
            self.store.increment(key).await?
        };

        Ok(LimitResult::allowed(
            policy.limit().saturating_sub(count),
            reset_at,
        ))
    }

    /// Report current usage for `key` without consuming quota or writing.
    pub async fn peek(&self, key: &str, policy: &RateLimitPolicy) -> Result<UsageSnapshot> {
        let now = self.clock.now_millis();

        let record = match self.store.get(key).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };

        let state = WindowState::of(record.as_ref(), now, policy);
        Ok(UsageSnapshot {
            count: state.count(),
            remaining: policy.limit().saturating_sub(state.count()),
            reset: state.reset_at(),
        })
    }
}

#[async_trait]
impl<S: CounterStore> QuotaBackend for QuotaManager<S> {
    async fn check_and_consume(&self, key: &str, policy: &RateLimitPolicy) -> Result<LimitResult> {
        QuotaManager::check_and_consume(self, key, policy).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::QuotaError;
    use crate::store::{DurableCounterStore, MemoryCounterStore, MemoryIdentityStore};
    use std::time::Duration;
    use tokio_test::assert_ok;

    const START: i64 = 1_700_000_000_000;

    fn policy(limit: u64, window_ms: u64) -> RateLimitPolicy {
        RateLimitPolicy::new(limit, Duration::from_millis(window_ms)).unwrap()
    }

    fn memory_manager() -> (QuotaManager<MemoryCounterStore>, MockClock) {
        let clock = MockClock::new(START);
        let manager = QuotaManager::with_clock(MemoryCounterStore::new(), Arc::new(clock.clone()));
        (manager, clock)
    }

    #[tokio::test]
    async fn test_three_per_ten_seconds_scenario() {
        let (manager, clock) = memory_manager();
        let policy = policy(3, 10_000);

        for expected in [2, 1, 0] {
            let result = manager.check_and_consume("chat_1.2.3.4", &policy).await.unwrap();
            assert!(result.success);
            assert_eq!(result.remaining, expected);
            assert_eq!(result.reset, START + 10_000);
        }

        let result = manager.check_and_consume("chat_1.2.3.4", &policy).await.unwrap();
        assert_eq!(result, LimitResult::denied(START + 10_000));

        clock.advance(Duration::from_millis(10_001));
        let result = manager.check_and_consume("chat_1.2.3.4", &policy).await.unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, 2);
        assert_eq!(result.reset, START + 10_001 + 10_000);
    }

    #[tokio::test]
    async fn test_zero_limit_always_denies() {
        let (manager, clock) = memory_manager();
        let policy = policy(0, 5_000);

        for _ in 0..3 {
            let result = manager.check_and_consume("blocked", &policy).await.unwrap();
            assert!(!result.success);
            assert_eq!(result.remaining, 0);
            clock.advance(Duration::from_millis(6_000));
        }

        let record = manager.store().get("blocked").await.unwrap().unwrap();
        assert_eq!(record.count, 0);
    }

    #[tokio::test]
    async fn test_denials_do_not_consume() {
        let (manager, _clock) = memory_manager();
        let policy = policy(2, 60_000);

        manager.check_and_consume("k", &policy).await.unwrap();
        manager.check_and_consume("k", &policy).await.unwrap();

        for _ in 0..5 {
            let result = manager.check_and_consume("k", &policy).await.unwrap();
            assert_eq!(result, LimitResult::denied(START + 60_000));
        }

        assert_eq!(manager.store().get("k").await.unwrap().unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let (manager, clock) = memory_manager();
        let policy = policy(1, 1_000);

        assert!(manager.check_and_consume("k", &policy).await.unwrap().success);

        clock.advance(Duration::from_millis(1_000));
        assert!(!manager.check_and_consume("k", &policy).await.unwrap().success);

        clock.advance(Duration::from_millis(1));
        assert!(manager.check_and_consume("k", &policy).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_expired_window_resets_high_count() {
        let (manager, clock) = memory_manager();
        manager
            .store()
            .set_reset("k", CounterRecord::new(500, START - 1))
            .await
            .unwrap();

        let result = manager.check_and_consume("k", &policy(10, 1_000)).await.unwrap();
        assert!(result.success);
        assert_eq!(result.remaining, 9);
        assert_eq!(result.reset, clock.now_millis() + 1_000);
        assert_eq!(manager.store().get("k").await.unwrap().unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_remaining_never_negative_when_limit_lowered() {
        let (manager, _clock) = memory_manager();

        for _ in 0..5 {
            manager.check_and_consume("k", &policy(10, 60_000)).await.unwrap();
        }

        let result = manager.check_and_consume("k", &policy(3, 60_000)).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (manager, _clock) = memory_manager();
        let policy = policy(1, 60_000);

        assert!(manager.check_and_consume("password_upd_10.0.0.1", &policy).await.unwrap().success);
        assert!(manager.check_and_consume("password_upd_10.0.0.2", &policy).await.unwrap().success);
        assert!(!manager.check_and_consume("password_upd_10.0.0.1", &policy).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_peek_does_not_write() {
        let (manager, clock) = memory_manager();
        let policy = policy(3, 10_000);

        let snapshot = manager.peek("k", &policy).await.unwrap();
        assert_eq!(
            snapshot,
            UsageSnapshot { count: 0, remaining: 3, reset: START + 10_000 }
        );
        assert!(manager.store().is_empty());

        manager.check_and_consume("k", &policy).await.unwrap();
        clock.advance(Duration::from_millis(500));
        let snapshot = manager.peek("k", &policy).await.unwrap();
        assert_eq!(
            snapshot,
            UsageSnapshot { count: 1, remaining: 2, reset: START + 10_000 }
        );
    }

    #[tokio::test]
    async fn test_durable_unknown_identity_denied() {
        let clock = MockClock::new(START);
        let store = DurableCounterStore::new(MemoryIdentityStore::new());
        let manager = QuotaManager::with_clock(store, Arc::new(clock));

        let result = manager.check_and_consume("ghost", &policy(3, 1_000)).await.unwrap();
        assert_eq!(result, LimitResult::denied(START + 1_000));

        let snapshot = assert_ok!(manager.peek("ghost", &policy(3, 1_000)).await);
        assert_eq!(snapshot.remaining, 3);
    }

    #[tokio::test]
    async fn test_durable_outage_propagates() {
        let identities = Arc::new(MemoryIdentityStore::new());
        identities.register("user-1");
        let manager = QuotaManager::new(DurableCounterStore::new(identities.clone()));

        identities.set_available(false);
        let err = manager.check_and_consume("user-1", &policy(3, 1_000)).await.unwrap_err();
        assert!(matches!(err, QuotaError::Store(StoreError::Unavailable(_))));
        assert!(manager.peek("user-1", &policy(3, 1_000)).await.is_err());
    }

    #[tokio::test]
    async fn test_durable_window_lifecycle() {
        let clock = MockClock::new(START);
        let identities = Arc::new(MemoryIdentityStore::new());
        identities.register("user-1");
        let manager = QuotaManager::with_clock(
            DurableCounterStore::new(identities.clone()),
            Arc::new(clock.clone()),
        );
        let policy = policy(2, 1_000);

        assert_eq!(manager.check_and_consume("user-1", &policy).await.unwrap().remaining, 1);
        assert_eq!(manager.check_and_consume("user-1", &policy).await.unwrap().remaining, 0);
        assert!(!manager.check_and_consume("user-1", &policy).await.unwrap().success);

        let stored = identities.record("user-1").unwrap();
        assert_eq!(stored.count, 2);
        assert_eq!(stored.reset_at, Some(START + 1_000));

        clock.advance(Duration::from_secs(2));
        assert!(manager.check_and_consume("user-1", &policy).await.unwrap().success);
        let stored = identities.record("user-1").unwrap();
        assert_eq!(stored.count, 1);
        assert_eq!(stored.reset_at, Some(START + 3_000));
    }
}
