use std::sync::Arc;

use paygate_application::{
    AdmissionService, CredentialCache, RateLimitRepository, RateLimitService,
};
use paygate_core::{AppError, Clock, SystemClock};
use paygate_infrastructure::{
    HttpCredentialAuthority, InMemoryRateLimitRepository, RedisRateLimitRepository,
};
use tracing::{info, warn};

use crate::api_config::ApiConfig;
use crate::state::AppState;

use super::redis::build_redis_client;

pub fn build_app_state(config: &ApiConfig) -> Result<AppState, AppError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let http_client = reqwest::Client::builder()
        .timeout(config.auth_service_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build http client: {error}")))?;
    let authority = HttpCredentialAuthority::new(http_client, &config.auth_service_url)?;
    info!(
        auth_endpoint = %authority.auth_endpoint(),
        cache_ttl_seconds = config.credential_cache_ttl.as_secs(),
        "credential authority configured"
    );

    let credential_cache = CredentialCache::new(
        Arc::new(authority),
        clock.clone(),
        config.credential_cache_ttl,
        config.auth_service_timeout,
    )?;

    let local_rate_limit_repository = Arc::new(InMemoryRateLimitRepository::new(clock.clone()));
    let redis_repository = config
        .redis_url
        .as_deref()
        .map(build_redis_client)
        .transpose()?
        .map(|client| {
            Arc::new(RedisRateLimitRepository::new(
                client,
                config.rate_limit_key_prefix.clone(),
            ))
        });

    let rate_limit_service = match &redis_repository {
        Some(redis_repository) => {
            let shared: Arc<dyn RateLimitRepository> = redis_repository.clone();
            RateLimitService::new(
                shared,
                local_rate_limit_repository.clone(),
                config.rate_limit_policy.clone(),
                config.rate_limit_settings,
                clock.clone(),
            )
        }
        None => {
            warn!("REDIS_URL not configured; rate limits are enforced per instance only");
            RateLimitService::local_only(
                local_rate_limit_repository.clone(),
                config.rate_limit_policy.clone(),
                clock.clone(),
            )
        }
    };

    for rule in rate_limit_service.policy().rules() {
        info!(
            operation_class = %rule.operation_class,
            max_requests = rule.max_requests,
            window_ms = u64::try_from(rule.window.as_millis()).unwrap_or(u64::MAX),
            "rate limit rule loaded"
        );
    }

    Ok(AppState {
        admission_service: AdmissionService::new(credential_cache, rate_limit_service, clock),
        local_rate_limit_repository,
        redis_repository,
        redis_timeout: config.rate_limit_settings.store_timeout,
    })
}
