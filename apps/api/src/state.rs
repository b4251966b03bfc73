use std::sync::Arc;
use std::time::Duration;

use paygate_application::AdmissionService;
use paygate_infrastructure::{InMemoryRateLimitRepository, RedisRateLimitRepository};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub admission_service: AdmissionService,
    pub local_rate_limit_repository: Arc<InMemoryRateLimitRepository>,
    pub redis_repository: Option<Arc<RedisRateLimitRepository>>,
    pub redis_timeout: Duration,
}
