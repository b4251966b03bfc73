use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

const HEALTHY: i64 = i64::MIN;

/// Recent shared-store failures, used to route calls to the shared or local counter.
///
/// After a failure the shared store is skipped until the cool-down elapses.
/// The first call after that probes the store again; concurrent callers keep
/// using the local counter until the probe reports back.
#[derive(Debug)]
pub struct BackendHealth {
    consecutive_failures: AtomicU32,
    skip_until_millis: AtomicI64,
    cooldown_millis: i64,
}

impl BackendHealth {
    /// Creates a healthy tracker with the given cool-down.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            skip_until_millis: AtomicI64::new(HEALTHY),
            cooldown_millis: i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Decides whether the call at `now_millis` should try the shared store.
    pub fn should_try_shared_store(&self, now_millis: i64) -> bool {
        let skip_until = self.skip_until_millis.load(Ordering::Acquire);
        if skip_until == HEALTHY {
            return true;
        }

        if now_millis < skip_until {
            return false;
        }

        self.skip_until_millis
            .compare_exchange(
                skip_until,
                now_millis.saturating_add(self.cooldown_millis),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Records a successful shared-store call. Returns `true` when this ends a degraded period.
    pub fn record_success(&self) -> bool {
        self.skip_until_millis.store(HEALTHY, Ordering::Release);
        self.consecutive_failures.swap(0, Ordering::AcqRel) > 0
    }

    /// Records a failed shared-store call and re-arms the cool-down.
    ///
    /// Returns the number of consecutive failures including this one.
    pub fn record_failure(&self, now_millis: i64) -> u32 {
        self.skip_until_millis.store(
            now_millis.saturating_add(self.cooldown_millis),
            Ordering::Release,
        );
        self.consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1)
    }

    /// Returns whether the last shared-store call failed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures() > 0
    }

    /// Returns the number of consecutive shared-store failures.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }
}
