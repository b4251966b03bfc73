use async_trait::async_trait;
use paygate_core::AppResult;
use paygate_domain::RateLimitKey;

/// Counter port shared by the coordination-store and in-process implementations.
#[async_trait]
pub trait RateLimitRepository: Send + Sync {
    /// Records an attempt against the window identified by `key`.
    ///
    /// The increment must be atomic: concurrent attempts on one key are all
    /// counted. The first increment of a window arms its expiry so that
    /// abandoned windows are reclaimed without explicit deletes. Returns the
    /// post-increment count.
    async fn record_attempt(&self, key: &RateLimitKey) -> AppResult<AttemptInfo>;

    /// Reads the count of a window without incrementing it.
    async fn current_count(&self, key: &RateLimitKey) -> AppResult<u64>;
}

/// Information about the current rate limit window for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptInfo {
    /// Number of attempts in the current window (including this one).
    pub attempt_count: u64,
}
