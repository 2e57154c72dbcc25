//! Quota evaluation logic and limiter call sites.

mod backend;
mod counter;
mod descriptor;
mod fallback;
mod limiter;
mod policy;
mod rules;
mod tier;

pub use backend::QuotaBackend;
pub use counter::{is_expired, CounterRecord, LimitResult, UsageSnapshot, WindowState};
pub use descriptor::{client_ip, IdentityKey, LOOPBACK};
pub use fallback::FallbackLimiter;
pub use limiter::QuotaManager;
pub use policy::{PolicyConfig, RateLimitPolicy, TimeUnit};
pub use rules::{CompiledRule, GateConfig, RouteRule, RouteRules};
pub use tier::{ChatConfig, ChatQuota, ChatUsage, Tier, TierPolicies};
