//! Rate-limit keys, fixed windows and limiter decisions.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use paygate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Named bucket of request types with its own independent budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Resource creation such as new payments or agreements.
    Create,
    /// Single resource reads.
    Read,
    /// Collection searches.
    Search,
    /// Cancellation of payments or agreements.
    Cancel,
    /// Capture of delayed payments.
    Capture,
    /// Refund submission.
    Refund,
}

impl OperationClass {
    /// Every operation class, in a stable order.
    pub const ALL: [Self; 6] = [
        Self::Create,
        Self::Read,
        Self::Search,
        Self::Cancel,
        Self::Capture,
        Self::Refund,
    ];

    /// Returns the stable name used in keys, logs and configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Search => "search",
            Self::Cancel => "cancel",
            Self::Capture => "capture",
            Self::Refund => "refund",
        }
    }
}

impl Display for OperationClass {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for OperationClass {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| AppError::Validation(format!("unknown operation class '{value}'")))
    }
}

/// Counter identity for one principal, operation class and fixed window.
///
/// Windows are aligned to the Unix epoch so that all gateway instances agree
/// on bucket boundaries without coordination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    principal: String,
    operation_class: OperationClass,
    window_millis: i64,
    window_index: i64,
}

impl RateLimitKey {
    /// Resolves the key of the window that contains `now`.
    pub fn for_instant(
        principal: &AccountId,
        operation_class: OperationClass,
        window: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let window_millis = i64::try_from(window.as_millis()).map_err(|error| {
            AppError::Validation(format!("rate limit window is too large: {error}"))
        })?;
        if window_millis <= 0 {
            return Err(AppError::Validation(
                "rate limit window must be at least one millisecond".to_owned(),
            ));
        }

        Ok(Self {
            principal: principal.as_str().to_owned(),
            operation_class,
            window_millis,
            window_index: now.timestamp_millis().div_euclid(window_millis),
        })
    }

    /// Returns the principal the budget belongs to.
    #[must_use]
    pub fn principal(&self) -> &str {
        self.principal.as_str()
    }

    /// Returns the operation class of the budget.
    #[must_use]
    pub fn operation_class(&self) -> OperationClass {
        self.operation_class
    }

    /// Returns the window ordinal since the epoch.
    #[must_use]
    pub fn window_index(&self) -> i64 {
        self.window_index
    }

    /// Returns the window size.
    #[must_use]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_millis.unsigned_abs())
    }

    /// Returns the epoch millisecond at which the window opened.
    #[must_use]
    pub fn window_start_millis(&self) -> i64 {
        self.window_index.saturating_mul(self.window_millis)
    }

    /// Returns the epoch millisecond at which the next window opens.
    #[must_use]
    pub fn window_end_millis(&self) -> i64 {
        self.window_start_millis().saturating_add(self.window_millis)
    }

    /// Returns the time left in the window as seen from `now`.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        let left = self.window_end_millis() - now.timestamp_millis();
        Duration::from_millis(u64::try_from(left).unwrap_or(0))
    }

    /// Returns the counter name, unique per principal, class, window size and window.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}ms:{}",
            self.operation_class, self.principal, self.window_millis, self.window_index
        )
    }
}

/// Whether a request may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterOutcome {
    /// The request is within budget.
    Admit,
    /// The request exceeded the budget of its window.
    Reject,
}

/// Which counter produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Cross-instance counter in the shared coordination store.
    SharedStore,
    /// Per-instance counter used while the shared store is unreachable.
    LocalFallback,
}

impl DecisionSource {
    /// Returns the stable name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SharedStore => "shared_store",
            Self::LocalFallback => "local_fallback",
        }
    }
}

/// Admission verdict for one request, produced fresh per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterDecision {
    outcome: LimiterOutcome,
    key: RateLimitKey,
    count: u64,
    limit: u32,
    source: DecisionSource,
}

impl LimiterDecision {
    /// Derives the verdict from a post-increment window count.
    #[must_use]
    pub fn from_count(key: RateLimitKey, count: u64, limit: u32, source: DecisionSource) -> Self {
        let outcome = if count <= u64::from(limit) {
            LimiterOutcome::Admit
        } else {
            LimiterOutcome::Reject
        };

        Self {
            outcome,
            key,
            count,
            limit,
            source,
        }
    }

    /// Returns the verdict.
    #[must_use]
    pub fn outcome(&self) -> LimiterOutcome {
        self.outcome
    }

    /// Returns whether the request was admitted.
    #[must_use]
    pub fn is_admitted(&self) -> bool {
        self.outcome == LimiterOutcome::Admit
    }

    /// Returns the key the request was counted against.
    #[must_use]
    pub fn key(&self) -> &RateLimitKey {
        &self.key
    }

    /// Returns the post-increment count of the window.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Returns the configured ceiling of the window.
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns which counter produced the decision.
    #[must_use]
    pub fn source(&self) -> DecisionSource {
        self.source
    }

    /// Returns how long a rejected caller should wait, rounded up to whole seconds.
    #[must_use]
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.is_admitted() {
            return None;
        }

        let remaining = self.key.remaining_at(now).as_millis();
        let seconds = remaining.div_ceil(1_000).max(1);
        Some(u64::try_from(seconds).unwrap_or(u64::MAX))
    }
}
