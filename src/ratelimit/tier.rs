//! Subscription-tier chat quotas on durable user records.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::counter::LimitResult;
use super::limiter::QuotaManager;
use super::policy::{PolicyConfig, RateLimitPolicy, TimeUnit};
use crate::clock::Clock;
use crate::error::Result;
use crate::store::{DurableCounterStore, IdentityStore};

/// Subscription tier of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Free,
    Pro,
}

impl Tier {
    /// Map a stored subscription value to a tier.
    ///
    /// Users without a subscription, or with `FREE`, are on the free tier.
    /// Any other subscription is treated as paid.
    pub fn from_subscription(subscription: Option<&str>) -> Self {
        match subscription {
            None => Tier::Free,
            Some(s) if s.eq_ignore_ascii_case("FREE") => Tier::Free,
            Some(_) => Tier::Pro,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Free => write!(f, "FREE"),
            Tier::Pro => write!(f, "PRO"),
        }
    }
}

/// Chat policies per tier, as configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_free")]
    pub free: PolicyConfig,
    #[serde(default = "default_pro")]
    pub pro: PolicyConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            free: default_free(),
            pro: default_pro(),
        }
    }
}

fn default_free() -> PolicyConfig {
    PolicyConfig::new(3, TimeUnit::Hour, 6)
}

fn default_pro() -> PolicyConfig {
    PolicyConfig::new(70, TimeUnit::Day, 1)
}

/// Validated chat policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicies {
    pub free: RateLimitPolicy,
    pub pro: RateLimitPolicy,
}

impl TierPolicies {
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            free: config.free.to_policy()?,
            pro: config.pro.to_policy()?,
        })
    }

    pub fn for_tier(&self, tier: Tier) -> &RateLimitPolicy {
        match tier {
            Tier::Free => &self.free,
            Tier::Pro => &self.pro,
        }
    }
}

/// Usage status reported to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUsage {
    pub tier: Tier,
    pub limit: u64,
    pub count: u64,
    pub remaining: u64,
    pub reset: i64,
}

/// Per-user chat quota.
///
/// Counts live on the user's durable record. Store failures are returned to
/// the caller: without the record the quota cannot be enforced.
pub struct ChatQuota<I> {
    manager: QuotaManager<DurableCounterStore<I>>,
    policies: TierPolicies,
}

impl<I: IdentityStore> ChatQuota<I> {
    pub fn new(identities: I, policies: TierPolicies) -> Self {
        Self {
            manager: QuotaManager::new(DurableCounterStore::new(identities)),
            policies,
        }
    }

    pub fn with_clock(identities: I, policies: TierPolicies, clock: Arc<dyn Clock>) -> Self {
        Self {
            manager: QuotaManager::with_clock(DurableCounterStore::new(identities), clock),
            policies,
        }
    }

    /// Consume one chat message for `user_id` under its tier's policy.
    pub async fn consume(&self, user_id: &str, tier: Tier) -> Result<LimitResult> {
        let policy = self.policies.for_tier(tier);
        let result = self.manager.check_and_consume(user_id, policy).await?;
        if !result.success {
            debug!(user = %user_id, tier = %tier, "Chat quota exhausted");
        }
        Ok(result)
    }

    /// Report usage for `user_id` without consuming a message.
    pub async fn status(&self, user_id: &str, tier: Tier) -> Result<ChatUsage> {
        let policy = self.policies.for_tier(tier);
        let snapshot = self.manager.peek(user_id, policy).await?;
        Ok(ChatUsage {
            tier,
            limit: policy.limit(),
            count: snapshot.count,
            remaining: snapshot.remaining,
            reset: snapshot.reset,
        })
    }
}
