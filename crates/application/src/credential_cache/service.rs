use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use paygate_core::{AppError, AppResult, Clock};
use paygate_domain::{AuthorizationRecord, Credential, CredentialLookup};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::ports::CredentialAuthority;

/// Longest accepted freshness period for a cached credential.
pub const CREDENTIAL_CACHE_MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    record: AuthorizationRecord,
    inserted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Time-bounded cache of validated credentials in front of the auth upstream.
#[derive(Clone)]
pub struct CredentialCache {
    authority: Arc<dyn CredentialAuthority>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    lookup_timeout: Duration,
    entries: Arc<DashMap<Credential, CacheEntry>>,
    in_flight: Arc<DashMap<Credential, Flight>>,
}

/// One upstream lookup shared by every caller that missed the cache while it ran.
type Flight = Arc<OnceCell<FlightOutcome>>;

/// Result of a shared lookup, replayed to every caller of the same flight.
#[derive(Debug, Clone)]
enum FlightOutcome {
    Authorized(AuthorizationRecord),
    Rejected(String),
    Unavailable(String),
    Failed(String),
}

impl FlightOutcome {
    fn from_result(result: AppResult<AuthorizationRecord>) -> Self {
        match result {
            Ok(record) => Self::Authorized(record),
            Err(AppError::Unauthorized(message)) => Self::Rejected(message),
            Err(AppError::Unavailable(message)) => Self::Unavailable(message),
            Err(other) => Self::Failed(other.to_string()),
        }
    }

    fn into_result(self) -> AppResult<AuthorizationRecord> {
        match self {
            Self::Authorized(record) => Ok(record),
            Self::Rejected(message) => Err(AppError::Unauthorized(message)),
            Self::Unavailable(message) => Err(AppError::Unavailable(message)),
            Self::Failed(message) => Err(AppError::Internal(message)),
        }
    }
}

/// Releases a caller's hold on a flight, including when the caller is cancelled.
///
/// The last caller to leave removes the flight from the map, so outcomes are
/// never reused beyond the callers that were waiting on them.
struct FlightGuard<'a> {
    in_flight: &'a DashMap<Credential, Flight>,
    credential: &'a Credential,
    flight: Flight,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        // One reference lives in the map and one in this guard.
        self.in_flight.remove_if(self.credential, |_, current| {
            Arc::ptr_eq(current, &self.flight) && Arc::strong_count(current) <= 2
        });
    }
}

impl CredentialCache {
    /// Creates a cache that keeps positive lookups for `ttl`.
    ///
    /// Every upstream lookup is bounded by `lookup_timeout`.
    pub fn new(
        authority: Arc<dyn CredentialAuthority>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        lookup_timeout: Duration,
    ) -> AppResult<Self> {
        if ttl > CREDENTIAL_CACHE_MAX_TTL {
            return Err(AppError::Validation(format!(
                "credential cache ttl must not exceed {} seconds",
                CREDENTIAL_CACHE_MAX_TTL.as_secs()
            )));
        }

        let ttl = chrono::Duration::from_std(ttl).map_err(|error| {
            AppError::Validation(format!("invalid credential cache ttl: {error}"))
        })?;

        if lookup_timeout.is_zero() {
            return Err(AppError::Validation(
                "credential lookup timeout must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            authority,
            clock,
            ttl,
            lookup_timeout,
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
        })
    }

    /// Resolves a credential to its authorization record.
    ///
    /// Concurrent misses for the same credential share one upstream call and
    /// its outcome, failures included. Failures are not kept once the
    /// waiting callers have them.
    /// Returns `AppError::Unauthorized` when the upstream rejects the
    /// credential and `AppError::Unavailable` when the upstream cannot answer.
    pub async fn authenticate(&self, credential: &Credential) -> AppResult<AuthorizationRecord> {
        if let Some(entry) = self.fresh_entry(credential) {
            debug!(
                credential = %credential.fingerprint(),
                cached_for_ms = (self.clock.now() - entry.inserted_at).num_milliseconds(),
                "credential cache hit"
            );
            return Ok(entry.record);
        }

        let flight = self
            .in_flight
            .entry(credential.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let guard = FlightGuard {
            in_flight: &self.in_flight,
            credential,
            flight,
        };

        let outcome = guard
            .flight
            .get_or_init(|| self.resolve(credential))
            .await
            .clone();
        drop(guard);

        outcome.into_result()
    }

    /// Drops every entry whose freshness has lapsed. Returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Returns the number of cached credentials, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn pending_lookups(&self) -> usize {
        self.in_flight.len()
    }

    async fn resolve(&self, credential: &Credential) -> FlightOutcome {
        let result = match self.fresh_entry(credential) {
            Some(entry) => Ok(entry.record),
            None => self.lookup_and_store(credential).await,
        };

        FlightOutcome::from_result(result)
    }

    fn fresh_entry(&self, credential: &Credential) -> Option<CacheEntry> {
        let now = self.clock.now();
        let expired = match self.entries.get(credential) {
            Some(entry) if entry.expires_at > now => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries
                .remove_if(credential, |_, entry| entry.expires_at <= now);
        }

        None
    }

    async fn lookup_and_store(&self, credential: &Credential) -> AppResult<AuthorizationRecord> {
        let lookup =
            match tokio::time::timeout(self.lookup_timeout, self.authority.lookup(credential))
                .await
            {
                Ok(Ok(lookup)) => Ok(lookup),
                Ok(Err(AppError::Unavailable(message))) => Err(AppError::Unavailable(message)),
                Ok(Err(other)) => Err(AppError::Unavailable(format!(
                    "authentication service failed: {other}"
                ))),
                Err(_) => Err(AppError::Unavailable(format!(
                    "authentication service did not answer within {} ms",
                    self.lookup_timeout.as_millis()
                ))),
            };

        let lookup = match lookup {
            Ok(lookup) => lookup,
            Err(error) => {
                warn!(
                    credential = %credential.fingerprint(),
                    error = %error,
                    "authentication service unavailable"
                );
                return Err(error);
            }
        };

        match lookup {
            CredentialLookup::Valid(record) => {
                let inserted_at = self.clock.now();
                if self.ttl > chrono::Duration::zero() {
                    let expires_at = inserted_at.checked_add_signed(self.ttl).ok_or_else(|| {
                        AppError::Internal(format!(
                            "credential cache expiry overflows at {inserted_at}"
                        ))
                    })?;
                    self.entries.insert(
                        credential.clone(),
                        CacheEntry {
                            record: record.clone(),
                            inserted_at,
                            expires_at,
                        },
                    );
                }

                info!(
                    credential = %credential.fingerprint(),
                    account_id = %record.account_id(),
                    "credential validated"
                );
                Ok(record)
            }
            CredentialLookup::Invalid => {
                warn!(
                    credential = %credential.fingerprint(),
                    "credential rejected by authentication service"
                );
                Err(AppError::Unauthorized(
                    "credential is not recognised".to_owned(),
                ))
            }
        }
    }
}
