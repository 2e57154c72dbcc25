//! Rate limit policies and their configuration form.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};

/// Time unit for configured windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of one unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// An immutable `{limit, window}` pair.
///
/// A limit of zero is valid and denies every request. The window must be at
/// least one millisecond long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u64,
    window: Duration,
}

impl RateLimitPolicy {
    /// Create a policy, rejecting windows shorter than one millisecond.
    pub fn new(limit: u64, window: Duration) -> Result<Self> {
        if window.as_millis() == 0 {
            return Err(QuotaError::InvalidPolicy(format!(
                "window must be at least 1ms (limit {limit})"
            )));
        }
        if window.as_millis() > i64::MAX as u128 {
            return Err(QuotaError::InvalidPolicy(format!(
                "window of {window:?} overflows epoch timestamps"
            )));
        }
        Ok(Self { limit, window })
    }

    /// Maximum operations admitted per window.
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn window_millis(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

impl fmt::Display for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}ms", self.limit, self.window.as_millis())
    }
}

/// Policy as written in configuration files.
///
/// ```yaml
/// limit: 3
/// unit: hour
/// units: 6
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Number of operations allowed per window
    pub limit: u64,
    /// Unit of the window length
    pub unit: TimeUnit,
    /// How many units make up one window
    #[serde(default = "default_units")]
    pub units: u32,
}

fn default_units() -> u32 {
    1
}

impl PolicyConfig {
    pub fn new(limit: u64, unit: TimeUnit, units: u32) -> Self {
        Self { limit, unit, units }
    }

    /// Validate and convert into a [`RateLimitPolicy`].
    pub fn to_policy(&self) -> Result<RateLimitPolicy> {
        RateLimitPolicy::new(self.limit, self.unit.duration() * self.units)
    }
}
