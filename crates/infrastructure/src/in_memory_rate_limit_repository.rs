//! Per-instance rate limit counters used while the shared store is unreachable.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use paygate_application::{AttemptInfo, RateLimitRepository};
use paygate_core::{AppResult, Clock};
use paygate_domain::RateLimitKey;

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at_millis: i64,
}

/// In-memory adapter for rate limit counters.
///
/// Counters are sharded so that increments on different keys never contend
/// on one lock. Each key names a single window, so a new window always starts
/// from zero; windows that have closed are dropped by [`Self::evict_expired`].
pub struct InMemoryRateLimitRepository {
    counters: DashMap<String, WindowCounter>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRateLimitRepository {
    /// Creates an empty counter set.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: DashMap::new(),
            clock,
        }
    }

    /// Drops counters of windows that have closed. Returns how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now_millis = self.clock.now().timestamp_millis();
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| counter.expires_at_millis > now_millis);
        before.saturating_sub(self.counters.len())
    }

    /// Returns the number of tracked windows.
    #[must_use]
    pub fn tracked_windows(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl RateLimitRepository for InMemoryRateLimitRepository {
    async fn record_attempt(&self, key: &RateLimitKey) -> AppResult<AttemptInfo> {
        let mut counter = self
            .counters
            .entry(key.storage_key())
            .or_insert(WindowCounter {
                count: 0,
                expires_at_millis: key.window_end_millis(),
            });
        counter.count = counter.count.saturating_add(1);

        Ok(AttemptInfo {
            attempt_count: counter.count,
        })
    }

    async fn current_count(&self, key: &RateLimitKey) -> AppResult<u64> {
        Ok(self
            .counters
            .get(&key.storage_key())
            .map(|counter| counter.count)
            .unwrap_or(0))
    }
}
