//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod http_credential_authority;
mod in_memory_rate_limit_repository;
mod redis_rate_limit_repository;

pub use http_credential_authority::HttpCredentialAuthority;
pub use in_memory_rate_limit_repository::InMemoryRateLimitRepository;
pub use redis_rate_limit_repository::RedisRateLimitRepository;
