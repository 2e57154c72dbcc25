//! Redis-backed shared counter.
//!
//! Limits are evaluated inside Redis by a Lua script implementing a weighted
//! two-bucket sliding window: the count of the previous fixed window is
//! scaled by how much of it still overlaps the sliding window and added to
//! the current window's count. Each bucket expires after two windows.
//!
//! Keys look like `{prefix}{{identity}}:{window_index}`. The identity is a
//! hash tag so both buckets of one identity land in the same cluster slot.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{SharedCounter, StoreError};
use crate::clock::{Clock, SystemClock};
use crate::ratelimit::LimitResult;

const SLIDING_WINDOW_SCRIPT: &str = r#"
local current_key = KEYS[1]
local previous_key = KEYS[2]
local limit = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local elapsed = tonumber(ARGV[3])

local previous = tonumber(redis.call("GET", previous_key) or "0")
local current = tonumber(redis.call("GET", current_key) or "0")
local weighted = math.floor(previous * (1 - elapsed / window)) + current

if weighted >= limit then
  return {0, 0}
end

current = redis.call("INCR", current_key)
if current == 1 then
  redis.call("PEXPIRE", current_key, window * 2 + 1000)
end

return {1, limit - weighted - 1}
"#;

/// Configuration for the shared store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedStoreConfig {
    /// Redis URL; no shared store is used when unset
    #[serde(default)]
    pub url: Option<String>,

    /// Prefix for every key written to Redis
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for SharedStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_key_prefix() -> String {
    "quotaguard:".to_string()
}

/// [`SharedCounter`] backed by Redis.
pub struct RedisSharedCounter {
    connection: ConnectionManager,
    key_prefix: String,
    script: Script,
    clock: Box<dyn Clock>,
}

impl fmt::Debug for RedisSharedCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisSharedCounter")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisSharedCounter {
    /// Connect to the Redis instance at `url`.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        debug!(url = %url, "Connected to shared counter store");

        Ok(Self {
            connection,
            key_prefix: key_prefix.into(),
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            clock: Box::new(SystemClock::new()),
        })
    }

    /// Replace the clock used to pick the current bucket.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Connect using a [`SharedStoreConfig`]. Returns `None` if no URL is set.
    pub async fn from_config(config: &SharedStoreConfig) -> Result<Option<Self>, StoreError> {
        match config.url.as_deref() {
            Some(url) => Ok(Some(Self::connect(url, config.key_prefix.clone()).await?)),
            None => Ok(None),
        }
    }

    /// Redis key of bucket `index` for `key`.
    pub fn bucket_key(&self, key: &str, index: i64) -> String {
        bucket_key(&self.key_prefix, key, index)
    }
}

fn bucket_key(prefix: &str, key: &str, index: i64) -> String {
    format!("{}{{{}}}:{}", prefix, key, index)
}

/// Fixed-window bucket covering `now`, and how far into it `now` is.
pub fn bucket_position(now: i64, window_millis: i64) -> (i64, i64) {
    (now.div_euclid(window_millis), now.rem_euclid(window_millis))
}

#[async_trait]
impl SharedCounter for RedisSharedCounter {
    async fn evaluate(
        &self,
        key: &str,
        limit: u64,
        window: Duration,
    ) -> Result<LimitResult, StoreError> {
        let window_millis = window.as_millis().max(1) as i64;
        let now = self.clock.now_millis();
        let (index, elapsed) = bucket_position(now, window_millis);
        let reset = (index + 1) * window_millis;

        trace!(key = %key, limit = limit, bucket = index, "Evaluating shared counter");

        let mut connection = self.connection.clone();
        let (admitted, remaining): (i64, i64) = self
            .script
            .key(self.bucket_key(key, index))
            .key(self.bucket_key(key, index - 1))
            .arg(limit)
            .arg(window_millis)
            .arg(elapsed)
            .invoke_async(&mut connection)
            .await?;

        Ok(LimitResult {
            success: admitted == 1,
            remaining: remaining.max(0) as u64,
            reset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_position() {
        assert_eq!(bucket_position(25_000, 10_000), (2, 5_000));
        assert_eq!(bucket_position(30_000, 10_000), (3, 0));
        assert_eq!(bucket_position(9_999, 10_000), (0, 9_999));
    }

    #[test]
    fn test_bucket_keys_share_hash_tag() {
        let current = bucket_key("quotaguard:", "global_api_1.2.3.4", 7);
        let previous = bucket_key("quotaguard:", "global_api_1.2.3.4", 6);
        assert_eq!(current, "quotaguard:{global_api_1.2.3.4}:7");
        assert_eq!(previous, "quotaguard:{global_api_1.2.3.4}:6");
    }

    #[test]
    fn test_shared_store_config_defaults() {
        let config: SharedStoreConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, SharedStoreConfig::default());
        assert_eq!(config.key_prefix, "quotaguard:");
        assert!(config.url.is_none());
    }

    #[tokio::test]
    async fn test_from_config_without_url_is_none() {
        let counter = RedisSharedCounter::from_config(&SharedStoreConfig::default())
            .await
            .unwrap();
        assert!(counter.is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_is_an_error() {
        let result = RedisSharedCounter::connect("not a url", "test:").await;
        assert!(matches!(result, Err(StoreError::Redis(_))));
    }
}
