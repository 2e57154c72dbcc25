//! Wall-clock abstraction.
//!
//! Windows are stored as absolute epoch-millisecond timestamps so they can be
//! persisted in external stores. Everything that reads the time goes through
//! [`Clock`], which lets tests step over window boundaries deterministically.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + Debug {
    fn now_millis(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock.
///
/// Clones share the same time value, so a clone handed to a limiter can be
/// advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    now: Arc<Mutex<i64>>,
}

impl MockClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by.as_millis() as i64;
    }

    pub fn set(&self, millis: i64) {
        *self.now.lock() = millis;
    }
}

impl Clock for MockClock {
    fn now_millis(&self) -> i64 {
        *self.now.lock()
    }
}
