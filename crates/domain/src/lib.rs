//! Domain entities and invariants for gateway admission control.

#![forbid(unsafe_code)]

mod account;
mod credential;
mod rate_limit;

pub use account::{AccountId, AuthorizationRecord, CredentialLookup, TokenPaymentType};
pub use credential::{CREDENTIAL_MAX_LENGTH, Credential};
pub use rate_limit::{
    DecisionSource, LimiterDecision, LimiterOutcome, OperationClass, RateLimitKey,
};
