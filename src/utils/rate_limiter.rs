use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one hit for `key`; `false` once the key is over its quota.
    async fn allow(&self, key: &str) -> bool;
}

/// Fixed-window counter per key.
///
/// Each key's counter lives in a moka cache whose TTL is the window, so the
/// count resets when the entry expires.
pub struct WindowedRateLimiter {
    counters: Cache<String, Arc<AtomicU32>>,
    limit: u32,
}

impl WindowedRateLimiter {
    /// `limit == 0` disables limiting.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            counters: Cache::builder()
                .max_capacity(100_000) // tune based on head count
                .time_to_live(window)
                .build(),
            limit,
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }
}

#[async_trait]
impl RateLimiter for WindowedRateLimiter {
    async fn allow(&self, key: &str) -> bool {
        if self.limit == 0 {
            return true;
        }

        let counter = self
            .counters
            .get_with(key.to_string(), async { Arc::new(AtomicU32::new(0)) })
            .await;

        let seen = counter.fetch_add(1, Ordering::Relaxed);
        if seen >= self.limit {
            tracing::warn!(key, limit = self.limit, "Rate limit exceeded");
            return false;
        }
        true
    }
}
