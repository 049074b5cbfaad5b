//! Bounded linear-backoff reconnection policy
//!
//! Attempt `n` waits `n * base_delay`. The policy is a pure decision; the
//! supervisor owns the counter and the timer.

use crate::session::ConnectionTarget;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

/// Outcome of consulting the policy after an unplanned termination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectionDecision {
    Proceed {
        attempt: u32,
        delay: Duration,
        target: ConnectionTarget,
    },
    AbortMaxAttempts,
    AbortNoTarget,
    AbortUserDisconnected,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Decide whether to schedule another attempt
    ///
    /// `attempts_so_far` is the current counter; `persisted_target` and
    /// `user_disconnected` come from the last persisted connection record.
    pub fn decide(
        &self,
        attempts_so_far: u32,
        persisted_target: Option<&ConnectionTarget>,
        user_disconnected: bool,
    ) -> ReconnectionDecision {
        if attempts_so_far >= self.max_attempts {
            return ReconnectionDecision::AbortMaxAttempts;
        }

        let Some(target) = persisted_target else {
            return ReconnectionDecision::AbortNoTarget;
        };

        if user_disconnected {
            return ReconnectionDecision::AbortUserDisconnected;
        }

        let attempt = attempts_so_far + 1;
        ReconnectionDecision::Proceed {
            attempt,
            delay: self.delay_for(attempt),
            target: target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn target() -> ConnectionTarget {
        ConnectionTarget::new("localhost", 25565)
    }

    #[test]
    fn test_first_attempt_waits_one_base_delay() {
        let policy = ReconnectPolicy::default();

        let decision = policy.decide(0, Some(&target()), false);

        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay: Duration::from_secs(5),
                target: target(),
            }
        );
    }

    #[test]
    fn test_linear_backoff() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(10), Duration::from_secs(50));
        let total: Duration = (1..=policy.max_attempts).map(|n| policy.delay_for(n)).sum();
        assert_eq!(total, Duration::from_secs(275));
    }

    #[test]
    fn test_stops_at_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(10, Some(&target()), false),
            ReconnectionDecision::AbortMaxAttempts
        );
        assert!(matches!(
            policy.decide(9, Some(&target()), false),
            ReconnectionDecision::Proceed { attempt: 10, .. }
        ));
    }

    #[test]
    fn test_requires_persisted_target() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(0, None, false),
            ReconnectionDecision::AbortNoTarget
        );
    }

    #[test]
    fn test_user_disconnect_suppresses_reconnect() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(0, Some(&target()), true),
            ReconnectionDecision::AbortUserDisconnected
        );
    }

    #[test]
    fn test_exhaustion_checked_before_target() {
        let policy = ReconnectPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.decide(3, None, true), ReconnectionDecision::AbortMaxAttempts);
    }

    proptest! {
        #[test]
        fn delays_are_linear_and_non_decreasing(
            max_attempts in 1u32..50,
            base_ms in 1u64..60_000,
        ) {
            let policy = ReconnectPolicy::new(max_attempts, Duration::from_millis(base_ms));
            let mut previous = Duration::ZERO;
            let mut counter = 0;

            while let ReconnectionDecision::Proceed { attempt, delay, .. } =
                policy.decide(counter, Some(&target()), false)
            {
                prop_assert_eq!(attempt, counter + 1);
                prop_assert_eq!(delay, Duration::from_millis(base_ms * attempt as u64));
                prop_assert!(delay >= previous);
                previous = delay;
                counter = attempt;
            }

            prop_assert_eq!(counter, max_attempts);
        }
    }
}
