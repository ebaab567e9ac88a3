//! Retry and backoff schedules for outbound requests.
//!
//! Delays here are cooperative pauses between attempts. They spread load
//! across shared services but do not enforce a hard request rate.

use std::time::Duration;

/// Upper bound for a single backoff pause.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Calculate exponential backoff delay for a given attempt (0-based).
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// How the pause between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt`, capped at [`MAX_BACKOFF`].
    Exponential,
    /// Same pause after every attempt.
    Fixed,
}

/// Bounded retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never zero.
    pub attempts: u32,
    /// Base pause between attempts.
    pub delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Exponential schedule: pauses of `base`, `2*base`, `4*base`, ...
    pub fn exponential(attempts: u32, base: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: base,
            backoff: Backoff::Exponential,
        }
    }

    /// Fixed schedule: the same pause between every attempt.
    pub fn fixed(attempts: u32, pause: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: pause,
            backoff: Backoff::Fixed,
        }
    }

    /// Pause to apply after the given failed attempt (0-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Exponential => backoff_delay(attempt, self.delay),
            Backoff::Fixed => self.delay,
        }
    }

    /// Whether another attempt follows the given one (0-based).
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt + 1 < self.attempts
    }

    /// Sleep for the pause that follows `attempt`, unless it was the last one.
    pub async fn pause(&self, attempt: u32) {
        if self.has_next(attempt) {
            let delay = self.delay_after(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(0, base), Duration::from_secs(1));
        assert_eq!(backoff_delay(1, base), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, base), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_is_capped() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(10, base), MAX_BACKOFF);
        assert_eq!(backoff_delay(40, base), MAX_BACKOFF);
    }

    #[test]
    fn test_fixed_policy_ignores_attempt() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.delay_after(0), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[test]
    fn test_has_next() {
        let policy = RetryPolicy::exponential(3, Duration::ZERO);
        assert!(policy.has_next(0));
        assert!(policy.has_next(1));
        assert!(!policy.has_next(2));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::fixed(0, Duration::ZERO);
        assert_eq!(policy.attempts, 1);
    }

    #[tokio::test]
    async fn test_pause_sleeps_the_schedule() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(100));
        let started = std::time::Instant::now();
        for attempt in 0..policy.attempts {
            policy.pause(attempt).await;
        }
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(700));
    }
}
