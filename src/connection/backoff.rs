//! Reconnection backoff
//!
//! Delay before reattempt `k` is `min(base * 2^(k-1), ceiling)`. The attempt
//! counter and delay reset after every successful connect; once the attempt
//! cap is reached no further delay is handed out.

use std::time::Duration;

use ::backoff::{backoff::Backoff, ExponentialBackoff};
use serde::Serialize;

use crate::error::{Error, Result};

/// Default first reconnect delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Default delay ceiling
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Default attempt cap
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Reconnection parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reattempt
    pub base_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Consecutive reattempts before giving up (0 = never give up)
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Reject policies whose delays cannot follow the doubling sequence
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(Error::Config(
                "reconnect base delay must be greater than 0".to_string(),
            ));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::Config(format!(
                "reconnect max delay ({}ms) is below the base delay ({}ms)",
                self.max_delay.as_millis(),
                self.base_delay.as_millis()
            )));
        }
        Ok(())
    }
}

/// Point-in-time view of the backoff state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconnectStatus {
    /// Reattempts scheduled since the last successful connect
    pub attempts: u32,

    /// Delay the next reattempt would wait
    pub next_delay: Duration,

    /// The attempt cap was hit and reconnection stopped for good
    pub exhausted: bool,
}

/// Attempt counter plus doubling delay
pub struct ReconnectBackoff {
    policy: ReconnectPolicy,
    attempts: u32,
    exhausted: bool,
    delays: ExponentialBackoff,
}

impl ReconnectBackoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        // First delay never exceeds the ceiling
        let first = policy.base_delay.min(policy.max_delay);

        // No jitter: delays must follow the doubling sequence exactly
        let delays = ExponentialBackoff {
            current_interval: first,
            initial_interval: first,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: policy.max_delay,
            max_elapsed_time: None,
            ..Default::default()
        };

        Self {
            policy,
            attempts: 0,
            exhausted: false,
            delays,
        }
    }

    /// Back to `{0, base delay}` after a successful connect
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.exhausted = false;
        self.delays.reset();
    }

    /// Record a failed or closed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once the
    /// attempt cap has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.max_attempts > 0 && self.attempts >= self.policy.max_attempts {
            self.exhausted = true;
            return None;
        }

        self.attempts += 1;
        Some(
            self.delays
                .next_backoff()
                .unwrap_or(self.policy.max_delay),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn current_delay(&self) -> Duration {
        self.delays.current_interval
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn status(&self) -> ReconnectStatus {
        ReconnectStatus {
            attempts: self.attempts,
            next_delay: self.current_delay(),
            exhausted: self.exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(delay: Option<Duration>) -> Option<u128> {
        delay.map(|d| d.as_millis())
    }

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
        assert_eq!(policy.max_delay, Duration::from_millis(30_000));
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_delays_double_until_cap() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy::default());

        assert_eq!(millis(backoff.next_delay()), Some(1000));
        assert_eq!(millis(backoff.next_delay()), Some(2000));
        assert_eq!(millis(backoff.next_delay()), Some(4000));
        assert_eq!(millis(backoff.next_delay()), Some(8000));
        assert_eq!(millis(backoff.next_delay()), Some(16000));
        assert_eq!(backoff.attempts(), 5);

        // Sixth failure: no new timer
        assert_eq!(backoff.next_delay(), None);
        assert!(backoff.is_exhausted());
        assert_eq!(backoff.attempts(), 5);
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_delay_ceiling() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(3000),
            max_attempts: 0,
        });

        let delays: Vec<_> = (0..5).map(|_| millis(backoff.next_delay())).collect();
        assert_eq!(
            delays,
            vec![Some(1000), Some(2000), Some(3000), Some(3000), Some(3000)]
        );
    }

    #[test]
    fn test_base_above_ceiling_is_clamped() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy {
            base_delay: Duration::from_millis(5000),
            max_delay: Duration::from_millis(1000),
            max_attempts: 5,
        });

        assert_eq!(backoff.status().next_delay.as_millis(), 1000);
        for _ in 0..5 {
            assert_eq!(millis(backoff.next_delay()), Some(1000));
        }
        assert_eq!(backoff.next_delay(), None);
    }

    #[test]
    fn test_policy_validation() {
        assert!(ReconnectPolicy::default().validate().is_ok());

        let zero_base = ReconnectPolicy {
            base_delay: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(zero_base.validate(), Err(Error::Config(_))));

        let inverted = ReconnectPolicy {
            base_delay: Duration::from_millis(5000),
            max_delay: Duration::from_millis(1000),
            max_attempts: 5,
        };
        assert!(matches!(inverted.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unlimited_attempts() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy {
            max_attempts: 0,
            ..Default::default()
        });

        for _ in 0..50 {
            assert!(backoff.next_delay().is_some());
        }
        assert!(!backoff.is_exhausted());
        assert_eq!(millis(Some(backoff.current_delay())), Some(30_000));
    }

    #[test]
    fn test_reset_after_success() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(millis(Some(backoff.current_delay())), Some(8000));

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(millis(backoff.next_delay()), Some(1000));
    }

    #[test]
    fn test_reset_clears_exhaustion() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy {
            max_attempts: 1,
            ..Default::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert!(backoff.status().exhausted);

        backoff.reset();
        assert!(!backoff.status().exhausted);
        assert!(backoff.next_delay().is_some());
    }

    #[test]
    fn test_status_snapshot() {
        let mut backoff = ReconnectBackoff::new(ReconnectPolicy::default());
        let status = backoff.status();
        assert_eq!(status.attempts, 0);
        assert_eq!(status.next_delay.as_millis(), 1000);

        backoff.next_delay();
        let status = backoff.status();
        assert_eq!(status.attempts, 1);
        assert_eq!(status.next_delay.as_millis(), 2000);
    }
}
