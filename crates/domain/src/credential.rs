//! Bearer credential parsing.
//!
//! A credential is an opaque token and is only ever used as a lookup key.
//! It must never reach the logs in full, so `Debug` is redacted and log
//! fields use [`Credential::fingerprint`].

use std::fmt::{Debug, Formatter, Write};

use paygate_core::{AppError, AppResult};
use sha2::{Digest, Sha256};

/// Upper bound on accepted bearer token length.
pub const CREDENTIAL_MAX_LENGTH: usize = 512;

const BEARER_SCHEME: &str = "bearer";
const FINGERPRINT_BYTES: usize = 6;

/// Opaque bearer token presented by a caller.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Creates a credential from a raw token value.
    pub fn new(token: impl Into<String>) -> AppResult<Self> {
        let token = token.into();

        if token.is_empty() {
            return Err(AppError::Unauthorized(
                "bearer token must not be empty".to_owned(),
            ));
        }

        if token.len() > CREDENTIAL_MAX_LENGTH {
            return Err(AppError::Unauthorized(format!(
                "bearer token must not exceed {CREDENTIAL_MAX_LENGTH} characters"
            )));
        }

        if !token.bytes().all(|byte| byte.is_ascii_graphic()) {
            return Err(AppError::Unauthorized(
                "bearer token contains invalid characters".to_owned(),
            ));
        }

        Ok(Self(token))
    }

    /// Parses an `Authorization` header value of the form `Bearer <token>`.
    ///
    /// The scheme is matched case-insensitively.
    pub fn from_authorization_header(value: &str) -> AppResult<Self> {
        let value = value.trim();
        let Some((scheme, token)) = value.split_once(' ') else {
            return Err(AppError::Unauthorized(
                "authorization header must use the Bearer scheme".to_owned(),
            ));
        };

        if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return Err(AppError::Unauthorized(
                "authorization header must use the Bearer scheme".to_owned(),
            ));
        }

        Self::new(token.trim_start())
    }

    /// Returns the raw token, for forwarding to the authentication upstream only.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Returns a short, stable, non-reversible identifier safe for logs.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest
            .iter()
            .take(FINGERPRINT_BYTES)
            .fold(String::with_capacity(FINGERPRINT_BYTES * 2), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }
}

impl Debug for Credential {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "Credential({})", self.fingerprint())
    }
}
