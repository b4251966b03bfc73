use axum::extract::{Request, State};
use axum::http::{Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use paygate_application::Admission;
use paygate_core::AppError;
use paygate_domain::OperationClass;
use tracing::info;

use crate::error::{ApiResult, ThrottledResponse};
use crate::state::AppState;

#[cfg(test)]
mod tests;

/// Authenticates the caller and spends one unit of its budget before dispatch.
///
/// Admitted requests carry the resolved `AuthorizationRecord` as an extension.
/// Rejected requests never reach the handler.
pub async fn admission_filter(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let operation_class = operation_class_for(request.method(), request.uri().path());
    let authorization_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().map(str::to_owned))
        .transpose()
        .map_err(|_| AppError::Unauthorized("authorization header is not ascii".to_owned()))?;

    let admission = state
        .admission_service
        .admit(authorization_header.as_deref(), operation_class)
        .await?;

    match admission {
        Admission::Admitted(admitted) => {
            request.extensions_mut().insert(admitted.authorization);
            Ok(next.run(request).await)
        }
        Admission::Throttled(throttled) => {
            info!(
                account_id = %throttled.authorization.account_id(),
                operation_class = %operation_class,
                retry_after_seconds = throttled.retry_after_seconds,
                source = throttled.decision.source().as_str(),
                "request throttled"
            );
            Ok(ThrottledResponse::new(throttled.retry_after_seconds).into_response())
        }
    }
}

/// Maps an inbound call onto the operation class whose budget it spends.
pub fn operation_class_for(method: &Method, path: &str) -> OperationClass {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let reading = matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS);

    match (reading, segments.as_slice()) {
        (false, ["v1", "payments"]) | (false, ["v1", "agreements"]) => OperationClass::Create,
        (true, ["v1", "payments"]) | (true, ["v1", "refunds"]) | (true, ["v1", "agreements"]) => {
            OperationClass::Search
        }
        (false, ["v1", "payments", _, "cancel"]) | (false, ["v1", "agreements", _, "cancel"]) => {
            OperationClass::Cancel
        }
        (false, ["v1", "payments", _, "capture"]) => OperationClass::Capture,
        (false, ["v1", "payments", _, "refunds"]) => OperationClass::Refund,
        (true, _) => OperationClass::Read,
        (false, _) => OperationClass::Create,
    }
}
