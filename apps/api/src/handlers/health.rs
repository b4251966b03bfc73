use axum::Json;
use axum::extract::State;

use crate::dto::{HealthDependencyStatus, HealthResponse};
use crate::state::AppState;

/// Liveness and dependency report. Always answers 200: degraded limiting is
/// not unavailability.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let redis = check_redis(&state).await;
    let rate_limiter = state.admission_service.rate_limit_service();
    let rate_limiter = if !rate_limiter.has_shared_store() {
        "local_only"
    } else if rate_limiter.is_degraded() {
        "degraded"
    } else {
        "shared"
    };

    Json(HealthResponse {
        status: "ok",
        redis,
        rate_limiter,
        cached_credentials: state.admission_service.credential_cache().len(),
    })
}

async fn check_redis(state: &AppState) -> HealthDependencyStatus {
    let Some(redis_repository) = &state.redis_repository else {
        return HealthDependencyStatus {
            status: "disabled",
            detail: None,
        };
    };

    match tokio::time::timeout(state.redis_timeout, redis_repository.ping()).await {
        Ok(Ok(())) => HealthDependencyStatus {
            status: "ok",
            detail: None,
        },
        Ok(Err(error)) => HealthDependencyStatus {
            status: "error",
            detail: Some(error.to_string()),
        },
        Err(_) => HealthDependencyStatus {
            status: "error",
            detail: Some(format!(
                "redis ping timed out after {} ms",
                state.redis_timeout.as_millis()
            )),
        },
    }
}
