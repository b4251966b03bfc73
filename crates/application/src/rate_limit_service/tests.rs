use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use paygate_core::{AppError, AppResult, ManualClock};
use paygate_domain::{AccountId, DecisionSource, LimiterOutcome, OperationClass, RateLimitKey};

use super::{
    AttemptInfo, RateLimitPolicy, RateLimitRepository, RateLimitRule, RateLimitService,
    RateLimitSettings,
};

#[derive(Default)]
struct FakeCounter {
    counts: Mutex<HashMap<String, u64>>,
    unreachable: AtomicBool,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeCounter {
    fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_counts(&self) -> AppResult<std::sync::MutexGuard<'_, HashMap<String, u64>>> {
        self.counts
            .lock()
            .map_err(|error| AppError::Internal(format!("failed to lock counter state: {error}")))
    }
}

#[async_trait]
impl RateLimitRepository for FakeCounter {
    async fn record_attempt(&self, key: &RateLimitKey) -> AppResult<AttemptInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("connection refused".to_owned()));
        }

        let mut counts = self.lock_counts()?;
        let count = counts.entry(key.storage_key()).or_insert(0);
        *count += 1;
        Ok(AttemptInfo {
            attempt_count: *count,
        })
    }

    async fn current_count(&self, key: &RateLimitKey) -> AppResult<u64> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::Unavailable("connection refused".to_owned()));
        }
        Ok(self
            .lock_counts()?
            .get(&key.storage_key())
            .copied()
            .unwrap_or(0))
    }
}

fn account(value: &str) -> AccountId {
    AccountId::new(value).unwrap_or_else(|_| panic!("test"))
}

fn clock() -> Arc<ManualClock> {
    let start = Utc
        .timestamp_millis_opt(1_700_000_000_000)
        .single()
        .unwrap_or_else(|| panic!("test"));
    Arc::new(ManualClock::new(start))
}

fn policy(class: OperationClass, max_requests: u32, window: Duration) -> RateLimitPolicy {
    RateLimitPolicy::default()
        .with_rule(RateLimitRule::new(class, max_requests, window).unwrap_or_else(|_| panic!("test")))
}

fn settings() -> RateLimitSettings {
    RateLimitSettings {
        store_timeout: Duration::from_millis(100),
        fallback_cooldown: Duration::from_secs(5),
    }
}

fn service(
    shared: Arc<FakeCounter>,
    fallback: Arc<FakeCounter>,
    policy: RateLimitPolicy,
    clock: Arc<ManualClock>,
) -> RateLimitService {
    RateLimitService::new(shared, fallback, policy, settings(), clock)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_attempts_admit_exactly_the_limit() {
    let shared = Arc::new(FakeCounter::default());
    let limiter = service(
        shared,
        Arc::new(FakeCounter::default()),
        policy(OperationClass::Create, 10, Duration::from_secs(60)),
        clock(),
    );

    let mut handles = Vec::new();
    for _ in 0..50 {
        let limiter = limiter.clone();
        handles.push(tokio::spawn(async move {
            limiter
                .try_admit(&account("acct-a"), OperationClass::Create)
                .await
                .map(|decision| decision.is_admitted())
        }));
    }

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(true)) => admitted += 1,
            Ok(Ok(false)) => rejected += 1,
            _ => panic!("admission must always produce a decision"),
        }
    }

    assert_eq!(admitted, 10);
    assert_eq!(rejected, 40);
}

#[tokio::test]
async fn rejected_attempts_still_consume_budget() {
    let shared = Arc::new(FakeCounter::default());
    let limiter = service(
        shared.clone(),
        Arc::new(FakeCounter::default()),
        policy(OperationClass::Search, 2, Duration::from_secs(1)),
        clock(),
    );
    let principal = account("acct-a");

    for _ in 0..5 {
        let _ = limiter.try_admit(&principal, OperationClass::Search).await;
    }

    let count = limiter
        .shared_count(&principal, OperationClass::Search)
        .await
        .unwrap_or_else(|_| panic!("test"));
    assert_eq!(count, Some(5));
}

#[tokio::test]
async fn new_window_admits_up_to_the_full_limit_again() {
    let clock = clock();
    let limiter = service(
        Arc::new(FakeCounter::default()),
        Arc::new(FakeCounter::default()),
        policy(OperationClass::Create, 3, Duration::from_secs(1)),
        clock.clone(),
    );
    let principal = account("acct-a");

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        let decision = limiter
            .try_admit(&principal, OperationClass::Create)
            .await
            .unwrap_or_else(|_| panic!("test"));
        outcomes.push(decision.outcome());
    }
    assert_eq!(outcomes.last(), Some(&LimiterOutcome::Reject));

    clock.advance(chrono::Duration::seconds(1));

    for _ in 0..3 {
        let decision = limiter
            .try_admit(&principal, OperationClass::Create)
            .await
            .unwrap_or_else(|_| panic!("test"));
        assert!(decision.is_admitted());
    }
    let decision = limiter
        .try_admit(&principal, OperationClass::Create)
        .await
        .unwrap_or_else(|_| panic!("test"));
    assert!(!decision.is_admitted());
}

#[tokio::test]
async fn exhausting_one_class_leaves_others_untouched() {
    let limiter = service(
        Arc::new(FakeCounter::default()),
        Arc::new(FakeCounter::default()),
        policy(OperationClass::Create, 1, Duration::from_secs(1)),
        clock(),
    );
    let principal = account("acct-a");

    let first = limiter.try_admit(&principal, OperationClass::Create).await;
    let second = limiter.try_admit(&principal, OperationClass::Create).await;
    let read = limiter.try_admit(&principal, OperationClass::Read).await;

    assert!(first.map(|decision| decision.is_admitted()).unwrap_or(false));
    assert!(!second.map(|decision| decision.is_admitted()).unwrap_or(true));
    assert!(read.map(|decision| decision.is_admitted()).unwrap_or(false));
}

#[tokio::test]
async fn unreachable_store_falls_back_to_local_counter_with_same_limit() {
    let shared = Arc::new(FakeCounter::default());
    shared.set_unreachable(true);
    let fallback = Arc::new(FakeCounter::default());
    let limiter = service(
        shared,
        fallback.clone(),
        policy(OperationClass::Create, 2, Duration::from_secs(1)),
        clock(),
    );
    let principal = account("acct-a");

    let mut decisions = Vec::new();
    for _ in 0..3 {
        let result = limiter.try_admit(&principal, OperationClass::Create).await;
        assert!(result.is_ok(), "store outage must not surface as an error");
        decisions.push(result.unwrap_or_else(|_| panic!("test")));
    }

    assert!(decisions[0].is_admitted());
    assert!(decisions[1].is_admitted());
    assert!(!decisions[2].is_admitted());
    assert!(
        decisions
            .iter()
            .all(|decision| decision.source() == DecisionSource::LocalFallback)
    );
    assert_eq!(fallback.calls(), 3);
    assert!(limiter.is_degraded());
}

#[tokio::test]
async fn degraded_limiter_skips_store_until_cooldown_elapses() {
    let shared = Arc::new(FakeCounter::default());
    shared.set_unreachable(true);
    let clock = clock();
    let limiter = service(
        shared.clone(),
        Arc::new(FakeCounter::default()),
        policy(OperationClass::Read, 100, Duration::from_secs(1)),
        clock.clone(),
    );
    let principal = account("acct-a");

    for _ in 0..5 {
        let _ = limiter.try_admit(&principal, OperationClass::Read).await;
    }
    assert_eq!(shared.calls(), 1);

    clock.advance(chrono::Duration::seconds(5));
    let _ = limiter.try_admit(&principal, OperationClass::Read).await;
    assert_eq!(shared.calls(), 2);
}

#[tokio::test]
async fn recovered_store_takes_over_again() {
    let shared = Arc::new(FakeCounter::default());
    shared.set_unreachable(true);
    let clock = clock();
    let limiter = service(
        shared.clone(),
        Arc::new(FakeCounter::default()),
        policy(OperationClass::Create, 100, Duration::from_secs(60)),
        clock.clone(),
    );
    let principal = account("acct-a");

    let degraded = limiter
        .try_admit(&principal, OperationClass::Create)
        .await
        .unwrap_or_else(|_| panic!("test"));
    assert_eq!(degraded.source(), DecisionSource::LocalFallback);

    shared.set_unreachable(false);
    clock.advance(chrono::Duration::seconds(6));

    let recovered = limiter
        .try_admit(&principal, OperationClass::Create)
        .await
        .unwrap_or_else(|_| panic!("test"));
    assert_eq!(recovered.source(), DecisionSource::SharedStore);
    assert!(!limiter.is_degraded());

    let stored = limiter
        .shared_count(&principal, OperationClass::Create)
        .await
        .unwrap_or_else(|_| panic!("test"));
    assert_eq!(stored, Some(1));
}

#[tokio::test]
async fn slow_store_is_treated_as_unreachable() {
    let shared = Arc::new(FakeCounter::slow(Duration::from_millis(500)));
    let fallback = Arc::new(FakeCounter::default());
    let limiter = service(
        shared,
        fallback.clone(),
        policy(OperationClass::Read, 10, Duration::from_secs(1)),
        clock(),
    );

    let decision = limiter
        .try_admit(&account("acct-a"), OperationClass::Read)
        .await
        .unwrap_or_else(|_| panic!("test"));

    assert!(decision.is_admitted());
    assert_eq!(decision.source(), DecisionSource::LocalFallback);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn local_only_limiter_enforces_rules_without_a_store() {
    let fallback = Arc::new(FakeCounter::default());
    let limiter = RateLimitService::local_only(
        fallback.clone(),
        policy(OperationClass::Cancel, 1, Duration::from_secs(1)),
        clock(),
    );
    let principal = account("acct-a");

    let first = limiter
        .try_admit(&principal, OperationClass::Cancel)
        .await
        .unwrap_or_else(|_| panic!("test"));
    let second = limiter
        .try_admit(&principal, OperationClass::Cancel)
        .await
        .unwrap_or_else(|_| panic!("test"));

    assert!(first.is_admitted());
    assert!(!second.is_admitted());
    assert!(!limiter.has_shared_store());
    assert_eq!(
        limiter
            .shared_count(&principal, OperationClass::Cancel)
            .await
            .ok(),
        Some(None)
    );
}

#[test]
fn rule_validation_rejects_degenerate_values() {
    assert!(RateLimitRule::new(OperationClass::Create, 0, Duration::from_secs(1)).is_err());
    assert!(RateLimitRule::new(OperationClass::Create, 1, Duration::from_micros(10)).is_err());
}

#[test]
fn default_policy_covers_every_class() {
    let policy = RateLimitPolicy::default();
    for class in OperationClass::ALL {
        assert_eq!(policy.rule_for(class).operation_class, class);
    }
    assert_eq!(policy.rules().count(), OperationClass::ALL.len());
}
