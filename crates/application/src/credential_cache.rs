//! Credential validation cache.
//!
//! Shields the authentication upstream from repeated lookups of the same
//! bearer token. Only positive answers are cached; a rejected credential is
//! looked up again on its next use.

mod ports;
mod service;


pub use ports::CredentialAuthority;
pub use service::{CREDENTIAL_CACHE_MAX_TTL, CredentialCache};
