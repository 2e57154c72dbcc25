//! Request gate applying route rules to incoming requests.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::ratelimit::{IdentityKey, LimitResult, QuotaBackend, RouteRules};

/// Outcome of one rule for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleStatus {
    /// Rule name
    pub rule: String,
    /// Identity key the rule was checked against
    pub key: String,
    /// Whether a denial from this rule blocks the request
    pub enforced: bool,
    /// Limiter decision, `None` if the limiter failed
    pub result: Option<LimitResult>,
}

/// Decision for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    /// Name of the rule that blocked the request
    pub denied_by: Option<String>,
    /// Seconds until the blocking rule's window resets
    pub retry_after_secs: Option<u64>,
    /// Per-rule outcomes in evaluation order
    pub statuses: Vec<RuleStatus>,
}

impl GateDecision {
    fn allow(statuses: Vec<RuleStatus>) -> Self {
        Self {
            allowed: true,
            denied_by: None,
            retry_after_secs: None,
            statuses,
        }
    }
}

/// Applies [`RouteRules`] to requests through a [`QuotaBackend`].
///
/// Matching rules are checked in order and evaluation stops at the first
/// enforced denial, so a blocked request does not consume quota of later
/// rules. A limiter error on an enforced rule blocks the request.
pub struct RequestGate<B> {
    backend: Arc<B>,
    rules: RouteRules,
    clock: Arc<dyn Clock>,
}

impl<B: QuotaBackend> RequestGate<B> {
    pub fn new(backend: Arc<B>, rules: RouteRules) -> Self {
        Self::with_clock(backend, rules, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(backend: Arc<B>, rules: RouteRules, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            rules,
            clock,
        }
    }

    pub fn rules(&self) -> &RouteRules {
        &self.rules
    }

    /// Decide whether a request for `path` from `ip` may proceed.
    #[instrument(skip(self))]
    pub async fn check(&self, path: &str, ip: &str) -> GateDecision {
        let mut statuses = Vec::new();

        for compiled in self.rules.matching(path) {
            let rule = &compiled.rule;
            let key = IdentityKey::new(&rule.key_prefix, ip).to_string_key();

            let outcome = self.backend.check_and_consume(&key, &compiled.policy).await;
            let result = match outcome {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(rule = %rule.name, key = %key, error = %e, "Limiter failed");
                    None
                }
            };

            statuses.push(RuleStatus {
                rule: rule.name.clone(),
                key: key.clone(),
                enforced: rule.enforce,
                result,
            });

            let denied = result.map_or(true, |r| !r.success);
            if !denied {
                continue;
            }

            if !rule.enforce {
                debug!(rule = %rule.name, key = %key, "Rule over limit but not enforced");
                continue;
            }

            let now = self.clock.now_millis();
            let retry_after_secs = result.map(|r| r.retry_after_secs(now));
            info!(
                rule = %rule.name,
                key = %key,
                retry_after_secs = ?retry_after_secs,
                "Request rate limited"
            );
            return GateDecision {
                allowed: false,
                denied_by: Some(rule.name.clone()),
                retry_after_secs,
                statuses,
            };
        }

        GateDecision::allow(statuses)
    }
}
