//! Counter records and window tracking.

use serde::{Deserialize, Serialize};

use super::policy::RateLimitPolicy;

/// Per-identity counter state as held by a counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Operations observed in the current window
    pub count: u64,
    /// Window expiry in epoch milliseconds, `None` if never used
    pub reset_at: Option<i64>,
}

impl CounterRecord {
    pub fn new(count: u64, reset_at: i64) -> Self {
        Self {
            count,
            reset_at: Some(reset_at),
        }
    }
}

/// Returns `true` if a window ending at `reset_at` has elapsed by `now`.
///
/// A missing `reset_at` counts as expired.
pub fn is_expired(reset_at: Option<i64>, now: i64) -> bool {
    match reset_at {
        Some(reset_at) => now > reset_at,
        None => true,
    }
}

/// The window a request is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// The stored window is still running.
    Active { count: u64, reset_at: i64 },
    /// The stored window elapsed (or never existed); a fresh one starts now.
    Expired { reset_at: i64 },
}

impl WindowState {
    /// Classify a stored record at `now` under `policy`.
    pub fn of(record: Option<&CounterRecord>, now: i64, policy: &RateLimitPolicy) -> Self {
        match record {
            Some(CounterRecord {
                count,
                reset_at: Some(reset_at),
            }) if !is_expired(Some(*reset_at), now) => WindowState::Active {
                count: *count,
                reset_at: *reset_at,
            },
            _ => WindowState::Expired {
                reset_at: now.saturating_add(policy.window_millis()),
            },
        }
    }

    /// Count to evaluate against; zero for a fresh window.
    pub fn count(&self) -> u64 {
        match self {
            WindowState::Active { count, .. } => *count,
            WindowState::Expired { .. } => 0,
        }
    }

    pub fn reset_at(&self) -> i64 {
        match self {
            WindowState::Active { reset_at, .. } | WindowState::Expired { reset_at } => *reset_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, WindowState::Expired { .. })
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitResult {
    /// Whether the operation was admitted
    pub success: bool,
    /// Operations left in the window after this one
    pub remaining: u64,
    /// Window expiry in epoch milliseconds
    pub reset: i64,
}

impl LimitResult {
    pub fn allowed(remaining: u64, reset: i64) -> Self {
        Self {
            success: true,
            remaining,
            reset,
        }
    }

    pub fn denied(reset: i64) -> Self {
        Self {
            success: false,
            remaining: 0,
            reset,
        }
    }

    /// Whole seconds until the window resets, rounded up, never negative.
    pub fn retry_after_secs(&self, now: i64) -> u64 {
        let millis = self.reset.saturating_sub(now).max(0) as u64;
        millis.div_ceil(1000)
    }
}

/// Read-only view of an identity's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub count: u64,
    pub remaining: u64,
    pub reset: i64,
}
