use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult, Clock};
use paygate_domain::{AccountId, DecisionSource, LimiterDecision, OperationClass, RateLimitKey};
use tracing::{debug, info, warn};

use super::config::{RateLimitPolicy, RateLimitSettings};
use super::health::BackendHealth;
use super::ports::{AttemptInfo, RateLimitRepository};

/// Application service for rate limiting.
///
/// Holds two counter strategies: the shared coordination store and the
/// per-instance fallback. [`BackendHealth`] selects between them per call.
#[derive(Clone)]
pub struct RateLimitService {
    shared: Option<Arc<dyn RateLimitRepository>>,
    fallback: Arc<dyn RateLimitRepository>,
    policy: Arc<RateLimitPolicy>,
    health: Arc<BackendHealth>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl RateLimitService {
    /// Creates a limiter that prefers `shared` and degrades to `fallback`.
    #[must_use]
    pub fn new(
        shared: Arc<dyn RateLimitRepository>,
        fallback: Arc<dyn RateLimitRepository>,
        policy: RateLimitPolicy,
        settings: RateLimitSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: Some(shared),
            fallback,
            policy: Arc::new(policy),
            health: Arc::new(BackendHealth::new(settings.fallback_cooldown)),
            clock,
            store_timeout: settings.store_timeout,
        }
    }

    /// Creates a limiter without a shared store. Each instance enforces its own ceiling.
    #[must_use]
    pub fn local_only(
        fallback: Arc<dyn RateLimitRepository>,
        policy: RateLimitPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shared: None,
            fallback,
            policy: Arc::new(policy),
            health: Arc::new(BackendHealth::new(Duration::ZERO)),
            clock,
            store_timeout: RateLimitSettings::default().store_timeout,
        }
    }

    /// Counts one request of `operation_class` for `principal` and decides on it.
    ///
    /// Shared-store failures never surface here: they switch the call to the
    /// local counter. Rejected attempts still consume budget.
    pub async fn try_admit(
        &self,
        principal: &AccountId,
        operation_class: OperationClass,
    ) -> AppResult<LimiterDecision> {
        let rule = self.policy.rule_for(operation_class);
        let now = self.clock.now();
        let key = RateLimitKey::for_instant(principal, operation_class, rule.window, now)?;

        let (attempt, source) = self.record_attempt(&key, now).await?;
        let decision =
            LimiterDecision::from_count(key, attempt.attempt_count, rule.max_requests, source);

        if decision.is_admitted() {
            debug!(
                account_id = %principal,
                operation_class = %operation_class,
                count = decision.count(),
                limit = decision.limit(),
                source = decision.source().as_str(),
                "request admitted"
            );
        } else {
            warn!(
                account_id = %principal,
                operation_class = %operation_class,
                count = decision.count(),
                limit = decision.limit(),
                source = decision.source().as_str(),
                "rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Reads the shared-store count of the current window, for diagnostics.
    ///
    /// Returns `None` when the limiter has no shared store.
    pub async fn shared_count(
        &self,
        principal: &AccountId,
        operation_class: OperationClass,
    ) -> AppResult<Option<u64>> {
        let Some(shared) = &self.shared else {
            return Ok(None);
        };

        let rule = self.policy.rule_for(operation_class);
        let key = RateLimitKey::for_instant(principal, operation_class, rule.window, self.clock.now())?;
        let count = tokio::time::timeout(self.store_timeout, shared.current_count(&key))
            .await
            .map_err(|_| {
                AppError::Unavailable("shared rate limit store read timed out".to_owned())
            })??;

        Ok(Some(count))
    }

    /// Returns whether decisions are currently coming from local counters.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.shared.is_none() || self.health.is_degraded()
    }

    /// Returns whether the limiter was configured with a shared store.
    #[must_use]
    pub fn has_shared_store(&self) -> bool {
        self.shared.is_some()
    }

    /// Returns the configured rules.
    #[must_use]
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    async fn record_attempt(
        &self,
        key: &RateLimitKey,
        now: DateTime<Utc>,
    ) -> AppResult<(AttemptInfo, DecisionSource)> {
        if let Some(shared) = &self.shared {
            if self.health.should_try_shared_store(now.timestamp_millis()) {
                match tokio::time::timeout(self.store_timeout, shared.record_attempt(key)).await {
                    Ok(Ok(attempt)) => {
                        if self.health.record_success() {
                            info!("shared rate limit store reachable again; leaving local fallback");
                        }
                        return Ok((attempt, DecisionSource::SharedStore));
                    }
                    Ok(Err(error)) => self.note_store_failure(now, &error.to_string()),
                    Err(_) => self.note_store_failure(
                        now,
                        &format!("no answer within {} ms", self.store_timeout.as_millis()),
                    ),
                }
            }
        }

        let attempt = self.fallback.record_attempt(key).await?;
        Ok((attempt, DecisionSource::LocalFallback))
    }

    fn note_store_failure(&self, now: DateTime<Utc>, reason: &str) {
        let failures = self.health.record_failure(now.timestamp_millis());
        if failures == 1 {
            warn!(
                error = %reason,
                "shared rate limit store unavailable; using local fallback counters"
            );
        } else {
            debug!(
                error = %reason,
                consecutive_failures = failures,
                "shared rate limit store still unavailable"
            );
        }
    }
}
