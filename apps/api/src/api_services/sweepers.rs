use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::api_config::ApiConfig;
use crate::state::AppState;

/// Starts the periodic eviction tasks. Callers abort the handles on shutdown.
pub fn spawn_sweepers(state: &AppState, config: &ApiConfig) -> Vec<JoinHandle<()>> {
    let credential_cache = state.admission_service.credential_cache().clone();
    let local_rate_limit_repository = state.local_rate_limit_repository.clone();

    vec![
        spawn_sweeper(
            "credential_cache",
            config.credential_cache_sweep_interval,
            move || credential_cache.evict_expired(),
        ),
        spawn_sweeper(
            "local_rate_limit",
            config.rate_limit_local_sweep_interval,
            move || local_rate_limit_repository.evict_expired(),
        ),
    ]
}

fn spawn_sweeper<F>(name: &'static str, period: Duration, sweep: F) -> JoinHandle<()>
where
    F: Fn() -> usize + Send + 'static,
{
    tokio::spawn(async move {
        info!(
            sweeper = name,
            interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            "sweeper started"
        );

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let evicted = sweep();
            if evicted > 0 {
                debug!(sweeper = name, evicted, "expired entries evicted");
            }
        }
    })
}
