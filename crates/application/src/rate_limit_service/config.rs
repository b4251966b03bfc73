use std::time::Duration;

use paygate_core::{AppError, AppResult};
use paygate_domain::OperationClass;

/// Ceiling for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    /// The operation class the rule governs.
    pub operation_class: OperationClass,
    /// Maximum number of admitted requests per window.
    pub max_requests: u32,
    /// Fixed window size.
    pub window: Duration,
}

impl RateLimitRule {
    /// Creates a validated rate limit rule.
    pub fn new(
        operation_class: OperationClass,
        max_requests: u32,
        window: Duration,
    ) -> AppResult<Self> {
        if max_requests == 0 {
            return Err(AppError::Validation(format!(
                "rate limit for '{operation_class}' must allow at least one request"
            )));
        }

        if window.as_millis() == 0 {
            return Err(AppError::Validation(format!(
                "rate limit window for '{operation_class}' must be at least one millisecond"
            )));
        }

        Ok(Self {
            operation_class,
            max_requests,
            window,
        })
    }

    const fn default_for(operation_class: OperationClass) -> Self {
        let max_requests = match operation_class {
            OperationClass::Create => 20,
            OperationClass::Read => 60,
            OperationClass::Search
            | OperationClass::Cancel
            | OperationClass::Capture
            | OperationClass::Refund => 10,
        };

        Self {
            operation_class,
            max_requests,
            window: Duration::from_secs(1),
        }
    }
}

/// One rule per operation class. Every class always has a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    rules: [RateLimitRule; OperationClass::ALL.len()],
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            rules: OperationClass::ALL.map(RateLimitRule::default_for),
        }
    }
}

impl RateLimitPolicy {
    /// Replaces the rule of the class named by `rule`.
    #[must_use]
    pub fn with_rule(mut self, rule: RateLimitRule) -> Self {
        self.rules[rule.operation_class as usize] = rule;
        self
    }

    /// Returns the rule governing an operation class.
    #[must_use]
    pub fn rule_for(&self, operation_class: OperationClass) -> &RateLimitRule {
        &self.rules[operation_class as usize]
    }

    /// Returns every rule in operation-class order.
    pub fn rules(&self) -> impl Iterator<Item = &RateLimitRule> {
        self.rules.iter()
    }
}

/// Tuning of the shared-store path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Upper bound for a single shared-store call; exceeding it counts as a failure.
    pub store_timeout: Duration,
    /// How long to stay on local counters after a shared-store failure.
    pub fallback_cooldown: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(250),
            fallback_cooldown: Duration::from_secs(5),
        }
    }
}
