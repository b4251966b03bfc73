//! Shared primitives for all Rust crates in Paygate.

#![forbid(unsafe_code)]

/// Wall-clock abstraction shared by caches and rate limiters.
pub mod clock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};

/// Result type used across Paygate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Caller credential is missing, malformed or rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller exhausted the request budget of the current window.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A dependency could not be reached or answered with a server error.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether a caller may retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Unavailable(_))
    }
}
