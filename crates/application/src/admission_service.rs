//! Admission pipeline: authenticate, then rate limit.
//!
//! Authentication always runs first. Limiter budgets are keyed by the
//! authenticated account, never by anything the caller asserts.

use std::sync::Arc;

use paygate_core::{AppError, AppResult, Clock};
use paygate_domain::{AuthorizationRecord, Credential, LimiterDecision, OperationClass};
use tracing::debug;

use crate::{CredentialCache, RateLimitService};

/// Request that passed both authentication and rate limiting.
#[derive(Debug, Clone)]
pub struct AdmittedRequest {
    /// Resolved account and tenant classification for downstream handlers.
    pub authorization: AuthorizationRecord,
    /// The limiter decision the request was admitted under.
    pub decision: LimiterDecision,
}

/// Authenticated request refused by the rate limiter.
#[derive(Debug, Clone)]
pub struct ThrottledRequest {
    /// Account whose budget is exhausted.
    pub authorization: AuthorizationRecord,
    /// The rejecting limiter decision.
    pub decision: LimiterDecision,
    /// Seconds until the current window closes, at least one.
    pub retry_after_seconds: u64,
}

/// Outcome of an authenticated admission attempt.
#[derive(Debug, Clone)]
pub enum Admission {
    /// Forward the request.
    Admitted(AdmittedRequest),
    /// Answer "too many requests".
    Throttled(ThrottledRequest),
}

/// Application service combining the credential cache and the rate limiter.
#[derive(Clone)]
pub struct AdmissionService {
    credential_cache: CredentialCache,
    rate_limit_service: RateLimitService,
    clock: Arc<dyn Clock>,
}

impl AdmissionService {
    /// Creates an admission service.
    #[must_use]
    pub fn new(
        credential_cache: CredentialCache,
        rate_limit_service: RateLimitService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credential_cache,
            rate_limit_service,
            clock,
        }
    }

    /// Runs the admission pipeline for one request.
    ///
    /// `authorization_header` is the raw `Authorization` header, if any.
    /// Authentication failures are `AppError::Unauthorized`, an unreachable
    /// auth upstream is `AppError::Unavailable`; no limiter budget is spent in
    /// either case.
    pub async fn admit(
        &self,
        authorization_header: Option<&str>,
        operation_class: OperationClass,
    ) -> AppResult<Admission> {
        let header = authorization_header.ok_or_else(|| {
            AppError::Unauthorized("missing bearer credential".to_owned())
        })?;
        let credential = Credential::from_authorization_header(header)?;

        let authorization = self.credential_cache.authenticate(&credential).await?;
        let decision = self
            .rate_limit_service
            .try_admit(authorization.account_id(), operation_class)
            .await?;

        match decision.retry_after_seconds(self.clock.now()) {
            None => {
                debug!(
                    account_id = %authorization.account_id(),
                    operation_class = %operation_class,
                    "admission granted"
                );
                Ok(Admission::Admitted(AdmittedRequest {
                    authorization,
                    decision,
                }))
            }
            Some(retry_after_seconds) => Ok(Admission::Throttled(ThrottledRequest {
                authorization,
                decision,
                retry_after_seconds,
            })),
        }
    }

    /// Returns the credential cache.
    #[must_use]
    pub fn credential_cache(&self) -> &CredentialCache {
        &self.credential_cache
    }

    /// Returns the rate limiter.
    #[must_use]
    pub fn rate_limit_service(&self) -> &RateLimitService {
        &self.rate_limit_service
    }
}
