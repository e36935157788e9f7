//! Retry budget and delay policy of the connection supervisor

use std::time::Duration;

use crate::config::ReconnectSettings;
use crate::gateway::FailureKind;

/// Configuration for reconnect backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Consecutive failed attempts before giving up (default: 5)
    pub max_attempts: u32,
    /// Multiplied by 2^attempt (default: 1s)
    pub base_delay: Duration,
    /// Upper bound of the exponential delay (default: 300s)
    pub cap_delay: Duration,
    /// Fixed delay after an unclassified failure (default: 10s)
    pub unexpected_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            cap_delay: Duration::from_secs(300),
            unexpected_delay: Duration::from_secs(10),
        }
    }
}

impl From<&ReconnectSettings> for BackoffPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_secs(settings.base_delay_secs),
            cap_delay: Duration::from_secs(settings.max_delay_secs),
            unexpected_delay: Duration::from_secs(settings.unexpected_delay_secs),
        }
    }
}

impl BackoffPolicy {
    /// `min(base_delay * 2^attempt, cap_delay)`, saturating instead of overflowing
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.cap_delay)
    }
}

/// What the supervisor does after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then attempt again
    RetryAfter(Duration),
    /// Attempt budget exhausted
    GiveUp { attempts: u32 },
    /// Failure must not be retried
    Abort,
}

/// Mutable retry counter
#[derive(Debug, Clone)]
pub struct BackoffState {
    attempt_count: u32,
    policy: BackoffPolicy,
}

impl BackoffState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            attempt_count: 0,
            policy,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Called once a connection is established
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Account for a failed attempt and decide what happens next.
    ///
    /// Network and unexpected failures share one counter; the attempt count
    /// never exceeds `max_attempts`.
    pub fn record_failure(&mut self, kind: FailureKind) -> RetryDecision {
        if kind == FailureKind::Fatal {
            return RetryDecision::Abort;
        }

        self.attempt_count = (self.attempt_count + 1).min(self.policy.max_attempts);
        if self.attempt_count >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.attempt_count,
            };
        }

        let delay = match kind {
            FailureKind::RecoverableNetwork => self.policy.exponential_delay(self.attempt_count),
            _ => self.policy.unexpected_delay,
        };
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_delay_matches_formula() {
        let policy = BackoffPolicy::default();
        for attempt in 1..=policy.max_attempts {
            let expected = Duration::from_secs((1u64 << attempt).min(300));
            assert_eq!(policy.exponential_delay(attempt), expected);
        }
    }

    #[test]
    fn test_exponential_delay_is_monotonic_until_cap() {
        let policy = BackoffPolicy {
            max_attempts: 40,
            ..BackoffPolicy::default()
        };
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let delay = policy.exponential_delay(attempt);
            assert!(delay >= previous);
            assert!(delay <= policy.cap_delay);
            previous = delay;
        }
        assert_eq!(policy.exponential_delay(39), Duration::from_secs(300));
    }

    #[test]
    fn test_network_failures_back_off_then_give_up() {
        let mut state = BackoffState::new(BackoffPolicy::default());
        let decisions: Vec<_> = (0..5)
            .map(|_| state.record_failure(FailureKind::RecoverableNetwork))
            .collect();

        assert_eq!(
            decisions,
            vec![
                RetryDecision::RetryAfter(Duration::from_secs(2)),
                RetryDecision::RetryAfter(Duration::from_secs(4)),
                RetryDecision::RetryAfter(Duration::from_secs(8)),
                RetryDecision::RetryAfter(Duration::from_secs(16)),
                RetryDecision::GiveUp { attempts: 5 },
            ]
        );
        assert_eq!(state.attempt_count(), 5);
    }

    #[test]
    fn test_unexpected_failures_share_the_budget() {
        let mut state = BackoffState::new(BackoffPolicy::default());
        assert_eq!(
            state.record_failure(FailureKind::RecoverableUnexpected),
            RetryDecision::RetryAfter(Duration::from_secs(10))
        );
        assert_eq!(
            state.record_failure(FailureKind::RecoverableNetwork),
            RetryDecision::RetryAfter(Duration::from_secs(4))
        );
        assert_eq!(state.attempt_count(), 2);
    }

    #[test]
    fn test_fatal_is_never_retried() {
        let mut state = BackoffState::new(BackoffPolicy::default());
        assert_eq!(state.record_failure(FailureKind::Fatal), RetryDecision::Abort);
        assert_eq!(state.attempt_count(), 0);
    }

    #[test]
    fn test_reset_restores_budget() {
        let mut state = BackoffState::new(BackoffPolicy::default());
        state.record_failure(FailureKind::RecoverableNetwork);
        state.record_failure(FailureKind::RecoverableNetwork);
        state.reset();
        assert_eq!(state.attempt_count(), 0);
        assert_eq!(
            state.record_failure(FailureKind::RecoverableNetwork),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_policy_from_settings() {
        let settings = ReconnectSettings {
            max_attempts: 0,
            base_delay_secs: 2,
            max_delay_secs: 60,
            unexpected_delay_secs: 5,
        };
        let policy = BackoffPolicy::from(&settings);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.exponential_delay(1), Duration::from_secs(4));
        assert_eq!(policy.unexpected_delay, Duration::from_secs(5));
    }
}
