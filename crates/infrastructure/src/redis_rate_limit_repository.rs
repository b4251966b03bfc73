//! Redis-backed rate limit repository.

use async_trait::async_trait;
use paygate_application::{AttemptInfo, RateLimitRepository};
use paygate_core::{AppError, AppResult};
use paygate_domain::RateLimitKey;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::sync::OnceCell;
use tracing::info;

const RECORD_ATTEMPT_SCRIPT: &str = r#"
local key = KEYS[1]
local window_ms = tonumber(ARGV[1])

local count = redis.call('INCR', key)
if redis.call('PTTL', key) < 0 then
  redis.call('PEXPIRE', key, window_ms)
end

return count
"#;

/// Redis implementation of the rate limit repository port.
///
/// Holds one multiplexed connection shared by every request. The connection
/// is opened on first use so that the gateway can start while Redis is down,
/// and is closed when the repository is dropped.
pub struct RedisRateLimitRepository {
    client: redis::Client,
    key_prefix: String,
    connection: OnceCell<ConnectionManager>,
    script: Script,
}

impl RedisRateLimitRepository {
    /// Creates a repository with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            connection: OnceCell::new(),
            script: Script::new(RECORD_ATTEMPT_SCRIPT),
        }
    }

    /// Sends `PING` over the shared connection.
    pub async fn ping(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let response: String = connection
            .ping()
            .await
            .map_err(|error| AppError::Unavailable(format!("redis ping failed: {error}")))?;

        if !response.eq_ignore_ascii_case("pong") {
            return Err(AppError::Unavailable(format!(
                "unexpected redis ping response: {response}"
            )));
        }

        Ok(())
    }

    fn key_for(&self, key: &RateLimitKey) -> String {
        format!("{}:{}", self.key_prefix, key.storage_key())
    }

    async fn connection(&self) -> AppResult<ConnectionManager> {
        self.connection
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone())
                    .await
                    .map_err(|error| {
                        AppError::Unavailable(format!("failed to connect to redis: {error}"))
                    })?;
                info!("redis rate limit connection established");
                Ok::<_, AppError>(manager)
            })
            .await
            .cloned()
    }
}

impl Drop for RedisRateLimitRepository {
    fn drop(&mut self) {
        if self.connection.initialized() {
            info!("closing redis rate limit connection");
        }
    }
}

#[async_trait]
impl RateLimitRepository for RedisRateLimitRepository {
    async fn record_attempt(&self, key: &RateLimitKey) -> AppResult<AttemptInfo> {
        let window_ms = u64::try_from(key.window().as_millis()).map_err(|error| {
            AppError::Validation(format!("invalid rate limit window duration: {error}"))
        })?;
        let mut connection = self.connection().await?;

        let attempt_count: u64 = self
            .script
            .key(self.key_for(key))
            .arg(window_ms)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to record redis rate limit attempt: {error}"
                ))
            })?;

        Ok(AttemptInfo { attempt_count })
    }

    async fn current_count(&self, key: &RateLimitKey) -> AppResult<u64> {
        let mut connection = self.connection().await?;
        let count: Option<u64> = connection.get(self.key_for(key)).await.map_err(|error| {
            AppError::Unavailable(format!("failed to read redis rate limit counter: {error}"))
        })?;

        Ok(count.unwrap_or(0))
    }
}
