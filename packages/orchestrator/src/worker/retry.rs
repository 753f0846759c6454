//! Retry and pacing policy, separated from I/O so it can be tested
//! in isolation.

use rand::Rng;
use std::time::Duration;

/// Classification of a failed network interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connection error, timeout, malformed response
    Transport,
    /// Non-2xx, non-404 status
    ServerStatus,
    /// 404: the target is gone, retrying will not help
    NotFound,
    /// 2xx body without the logged-in marker
    SessionExpired,
}

/// Bounded attempts with a jittered inter-attempt delay.
///
/// The delay doubles as deliberate request pacing, not just error
/// backoff: one credential must never burst.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay_min: Duration, delay_max: Duration) -> Self {
        Self {
            max_attempts,
            delay_min,
            delay_max,
        }
    }

    /// Portal login: 10 attempts, 5-10 s apart.
    pub fn login() -> Self {
        Self::new(10, Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Page fetch: 10 attempts, 5-10 s apart.
    pub fn fetch() -> Self {
        Self::new(10, Duration::from_secs(5), Duration::from_secs(10))
    }

    /// Instant variant for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn retryable(&self, class: ErrorClass) -> bool {
        matches!(
            class,
            ErrorClass::Transport | ErrorClass::ServerStatus | ErrorClass::SessionExpired
        )
    }

    pub fn jittered_delay(&self) -> Duration {
        jitter(self.delay_min, self.delay_max)
    }
}

/// Uniform random duration in `[min, max]`.
pub fn jitter(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let span = (max - min).as_millis() as u64;
    min + Duration::from_millis(rand::thread_rng().gen_range(0..=span))
}

/// Sleep for a jittered duration, logging it like the workers always
/// have so throttling is visible in the live log.
pub async fn jittered_sleep(min: Duration, max: Duration) {
    let delay = jitter(min, max);
    if delay > Duration::ZERO {
        tracing::debug!(seconds = delay.as_secs_f64(), "pacing sleep");
    }
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5), Duration::from_secs(10));
        for _ in 0..100 {
            let d = policy.jittered_delay();
            assert!(d >= Duration::from_secs(5));
            assert!(d <= Duration::from_secs(10));
        }
    }

    #[test]
    fn not_found_is_never_retryable() {
        let policy = RetryPolicy::fetch();
        assert!(!policy.retryable(ErrorClass::NotFound));
        assert!(policy.retryable(ErrorClass::Transport));
        assert!(policy.retryable(ErrorClass::ServerStatus));
        assert!(policy.retryable(ErrorClass::SessionExpired));
    }

    #[test]
    fn degenerate_range_is_constant() {
        assert_eq!(
            jitter(Duration::from_secs(2), Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
