//! IP throttling on a shared counter with local fallback.
//!
//! Every check is first sent to the shared counter. If that fails for any
//! reason the same check is run against a process-local counter map instead,
//! so callers always receive a decision. While degraded each process enforces
//! its own limit: a fleet of N processes admits up to N times the configured
//! limit. No retry against the shared counter is made within a call.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{trace, warn};

use super::backend::QuotaBackend;
use super::counter::LimitResult;
use super::limiter::QuotaManager;
use super::policy::RateLimitPolicy;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::{MemoryCounterStore, SharedCounter};

/// A limiter that prefers a shared counter and degrades to local counters.
pub struct FallbackLimiter<S> {
    shared: Option<S>,
    local: QuotaManager<MemoryCounterStore>,
}

impl<S: SharedCounter> FallbackLimiter<S> {
    /// Create a limiter over `shared`, using the system clock for fallback.
    pub fn new(shared: S) -> Self {
        Self::with_clock(Some(shared), Arc::new(SystemClock::new()))
    }

    /// Create a limiter that only ever uses the local counters.
    pub fn local_only() -> Self {
        Self::with_clock(None, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(shared: Option<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            shared,
            local: QuotaManager::with_clock(MemoryCounterStore::new(), clock),
        }
    }

    /// Whether a shared counter is configured.
    pub fn has_shared(&self) -> bool {
        self.shared.is_some()
    }

    /// The process-local fallback counters.
    pub fn local(&self) -> &QuotaManager<MemoryCounterStore> {
        &self.local
    }

    pub async fn check_and_consume(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<LimitResult> {
        if let Some(shared) = &self.shared {
            match shared.evaluate(key, policy.limit(), policy.window()).await {
                Ok(result) => {
                    trace!(key = %key, success = result.success, "Shared counter decision");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        key = %key,
                        error = %e,
                        "Shared counter unavailable, falling back to local counters"
                    );
                }
            }
        }

        self.local.check_and_consume(key, policy).await
    }
}

#[async_trait]
impl<S: SharedCounter> QuotaBackend for FallbackLimiter<S> {
    async fn check_and_consume(&self, key: &str, policy: &RateLimitPolicy) -> Result<LimitResult> {
        FallbackLimiter::check_and_consume(self, key, policy).await
    }
}
