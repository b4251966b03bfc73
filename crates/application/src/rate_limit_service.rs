//! Rate limiting ports and application service.
//!
//! Implements a fixed-window limiter keyed by account, operation class and
//! window. Counters live in a shared store so that every gateway instance
//! enforces the same ceiling; while that store is unreachable each instance
//! falls back to its own in-process counters with the same rules.

mod config;
mod health;
mod ports;
mod service;

#[cfg(test)]
mod tests;

pub use config::{RateLimitPolicy, RateLimitRule, RateLimitSettings};
pub use health::BackendHealth;
pub use ports::{AttemptInfo, RateLimitRepository};
pub use service::RateLimitService;
