//! Application services and ports for gateway admission control.

#![forbid(unsafe_code)]

mod admission_service;
mod credential_cache;
mod rate_limit_service;

pub use admission_service::{Admission, AdmissionService, AdmittedRequest, ThrottledRequest};
pub use credential_cache::{
    CREDENTIAL_CACHE_MAX_TTL, CredentialAuthority, CredentialCache,
};
pub use rate_limit_service::{
    AttemptInfo, BackendHealth, RateLimitPolicy, RateLimitRepository, RateLimitRule,
    RateLimitService, RateLimitSettings,
};
