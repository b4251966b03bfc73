use serde::Serialize;

/// API error payload.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    code: &'static str,
    description: String,
}

impl ErrorResponse {
    pub fn new(code: &'static str, description: String) -> Self {
        Self { code, description }
    }
}

/// Reachability of one dependency.
#[derive(Debug, Serialize)]
pub struct HealthDependencyStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Health endpoint payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub redis: HealthDependencyStatus,
    pub rate_limiter: &'static str,
    pub cached_credentials: usize,
}

/// Authorization the admission filter resolved for a request.
#[derive(Debug, Serialize)]
pub struct AuthorizationResponse {
    pub account_id: String,
    pub token_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}
