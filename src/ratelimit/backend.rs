//! Quota backend trait for abstracting over limiter call sites.

use async_trait::async_trait;

use super::counter::LimitResult;
use super::policy::RateLimitPolicy;
use crate::error::Result;

/// Trait for quota limiter implementations.
///
/// This trait abstracts over the store-backed `QuotaManager` and the
/// `FallbackLimiter` so request-handling code can work with either.
#[async_trait]
pub trait QuotaBackend: Send + Sync {
    /// Check the quota for `key` under `policy`, consuming one unit if allowed.
    async fn check_and_consume(&self, key: &str, policy: &RateLimitPolicy) -> Result<LimitResult>;
}
