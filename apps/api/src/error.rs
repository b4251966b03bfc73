use axum::Json;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use paygate_core::AppError;
use tracing::{error, warn};

use crate::dto::ErrorResponse;

const CODE_VALIDATION: &str = "P0102";
const CODE_UNAUTHORIZED: &str = "P0110";
const CODE_RATE_LIMITED: &str = "P0900";
const CODE_UNAVAILABLE: &str = "P0920";
const CODE_INTERNAL: &str = "P0999";

/// HTTP API error wrapper around core application errors.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(value: AppError) -> Self {
        Self(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, description) = match &self.0 {
            AppError::Validation(message) => {
                (StatusCode::BAD_REQUEST, CODE_VALIDATION, message.clone())
            }
            AppError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                CODE_UNAUTHORIZED,
                "Credentials are required to access this resource".to_owned(),
            ),
            AppError::RateLimited(_) => (
                StatusCode::TOO_MANY_REQUESTS,
                CODE_RATE_LIMITED,
                "Too many requests".to_owned(),
            ),
            AppError::Unavailable(detail) => {
                warn!(error = %detail, "request failed on an unavailable dependency");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    CODE_UNAVAILABLE,
                    "Authentication service is temporarily unavailable".to_owned(),
                )
            }
            AppError::Internal(detail) => {
                error!(error = %detail, "request failed with an internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    CODE_INTERNAL,
                    "Unexpected internal error".to_owned(),
                )
            }
        };

        (status, Json(ErrorResponse::new(code, description))).into_response()
    }
}

/// Declined response for a request that exhausted its window budget.
#[derive(Debug, Clone, Copy)]
pub struct ThrottledResponse {
    retry_after_seconds: u64,
}

impl ThrottledResponse {
    pub fn new(retry_after_seconds: u64) -> Self {
        Self {
            retry_after_seconds: retry_after_seconds.max(1),
        }
    }
}

impl IntoResponse for ThrottledResponse {
    fn into_response(self) -> Response {
        let mut response =
            ApiError(AppError::RateLimited("window budget exhausted".to_owned())).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.retry_after_seconds.to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

/// Standard API result type.
pub type ApiResult<T> = Result<T, ApiError>;
