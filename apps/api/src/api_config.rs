use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use paygate_application::{
    CREDENTIAL_CACHE_MAX_TTL, RateLimitPolicy, RateLimitRule, RateLimitSettings,
};
use paygate_core::AppError;
use paygate_domain::OperationClass;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_API_PORT: u16 = 9100;
const DEFAULT_AUTH_SERVICE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_CREDENTIAL_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_CREDENTIAL_CACHE_SWEEP_INTERVAL_MS: u64 = 60_000;
const DEFAULT_RATE_LIMIT_KEY_PREFIX: &str = "paygate:rate_limit";
const DEFAULT_RATE_LIMIT_LOCAL_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_host: String,
    pub api_port: u16,
    pub auth_service_url: Url,
    pub auth_service_timeout: Duration,
    pub credential_cache_ttl: Duration,
    pub credential_cache_sweep_interval: Duration,
    pub redis_url: Option<String>,
    pub rate_limit_key_prefix: String,
    pub rate_limit_settings: RateLimitSettings,
    pub rate_limit_policy: RateLimitPolicy,
    pub rate_limit_local_sweep_interval: Duration,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    ///
    /// Blank values count as unset. Malformed values are rejected rather than
    /// replaced by defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_host = lookup("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned());
        let api_port = parse_or(&lookup, "API_PORT", DEFAULT_API_PORT)?;

        let auth_service_url = lookup("AUTH_SERVICE_URL")
            .ok_or_else(|| AppError::Validation("AUTH_SERVICE_URL is required".to_owned()))?;
        let auth_service_url = Url::parse(&auth_service_url)
            .map_err(|error| AppError::Validation(format!("invalid AUTH_SERVICE_URL: {error}")))?;

        let auth_service_timeout = positive_millis(
            &lookup,
            "AUTH_SERVICE_TIMEOUT_MS",
            DEFAULT_AUTH_SERVICE_TIMEOUT_MS,
        )?;
        let credential_cache_ttl = Duration::from_secs(parse_or(
            &lookup,
            "CREDENTIAL_CACHE_TTL_SECONDS",
            DEFAULT_CREDENTIAL_CACHE_TTL_SECONDS,
        )?);
        if credential_cache_ttl > CREDENTIAL_CACHE_MAX_TTL {
            return Err(AppError::Validation(format!(
                "CREDENTIAL_CACHE_TTL_SECONDS must not exceed {}",
                CREDENTIAL_CACHE_MAX_TTL.as_secs()
            )));
        }
        let credential_cache_sweep_interval = positive_millis(
            &lookup,
            "CREDENTIAL_CACHE_SWEEP_INTERVAL_MS",
            DEFAULT_CREDENTIAL_CACHE_SWEEP_INTERVAL_MS,
        )?;

        let redis_url = lookup("REDIS_URL");
        let rate_limit_key_prefix = lookup("RATE_LIMIT_KEY_PREFIX")
            .unwrap_or_else(|| DEFAULT_RATE_LIMIT_KEY_PREFIX.to_owned());

        let defaults = RateLimitSettings::default();
        let rate_limit_settings = RateLimitSettings {
            store_timeout: positive_millis(
                &lookup,
                "REDIS_TIMEOUT_MS",
                duration_millis(defaults.store_timeout),
            )?,
            fallback_cooldown: positive_millis(
                &lookup,
                "RATE_LIMIT_FALLBACK_COOLDOWN_MS",
                duration_millis(defaults.fallback_cooldown),
            )?,
        };

        let mut rate_limit_policy = RateLimitPolicy::default();
        for operation_class in OperationClass::ALL {
            let rule = rate_limit_rule(&lookup, &rate_limit_policy, operation_class)?;
            rate_limit_policy = rate_limit_policy.with_rule(rule);
        }

        let rate_limit_local_sweep_interval = positive_millis(
            &lookup,
            "RATE_LIMIT_LOCAL_SWEEP_INTERVAL_MS",
            DEFAULT_RATE_LIMIT_LOCAL_SWEEP_INTERVAL_MS,
        )?;

        Ok(Self {
            api_host,
            api_port,
            auth_service_url,
            auth_service_timeout,
            credential_cache_ttl,
            credential_cache_sweep_interval,
            redis_url,
            rate_limit_key_prefix,
            rate_limit_settings,
            rate_limit_policy,
            rate_limit_local_sweep_interval,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Validation(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn rate_limit_rule<F>(
    lookup: &F,
    policy: &RateLimitPolicy,
    operation_class: OperationClass,
) -> Result<RateLimitRule, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = format!(
        "RATE_LIMIT_{}",
        operation_class.as_str().to_ascii_uppercase()
    );
    let default_rule = policy.rule_for(operation_class);

    let max_requests = parse_or(
        lookup,
        &format!("{prefix}_REQUESTS"),
        default_rule.max_requests,
    )?;
    let window_ms = parse_or(
        lookup,
        &format!("{prefix}_WINDOW_MS"),
        duration_millis(default_rule.window),
    )?;

    RateLimitRule::new(
        operation_class,
        max_requests,
        Duration::from_millis(window_ms),
    )
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        None => Ok(default),
    }
}

fn positive_millis<F>(lookup: &F, name: &str, default: u64) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, name, default)?;
    if value == 0 {
        return Err(AppError::Validation(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(Duration::from_millis(value))
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
