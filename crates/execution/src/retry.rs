//! Gateway failure classification and backoff.
//!
//! Each pending gateway call is driven by an explicit `OrderAttempt` state
//! machine (attempt count, next delay) instead of nested retry control flow.

use perpbot_core::config::ExecutionConfig;
use perpbot_core::error::GatewayError;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Exponential backoff for the given 1-based attempt number, capped at
    /// `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// What to do after a failed gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Transient failure with attempts remaining: wait, then retry blindly.
    Retry { after: Duration },
    /// Outcome unknown (ambiguous, or transient budget exhausted): a
    /// reconciliation query must precede any further submission.
    Reconcile,
    /// Definitive rejection. Never retried.
    Fail { reason: String },
}

/// Per-call attempt state.
#[derive(Debug)]
pub struct OrderAttempt {
    policy: RetryPolicy,
    attempt: u32,
}

impl OrderAttempt {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    #[must_use]
    pub const fn attempts_made(&self) -> u32 {
        self.attempt
    }

    /// True while the transient retry budget is not exhausted.
    #[must_use]
    pub const fn budget_remaining(&self) -> bool {
        self.attempt < self.policy.max_attempts
    }

    /// Classifies a failure and advances the attempt counter.
    pub fn on_failure(&mut self, error: &GatewayError) -> AttemptOutcome {
        self.attempt += 1;
        match error {
            GatewayError::Transient(reason) => {
                if self.budget_remaining() {
                    let after = self.policy.delay_for(self.attempt);
                    tracing::debug!(attempt = self.attempt, ?after, reason, "transient gateway failure, retrying");
                    AttemptOutcome::Retry { after }
                } else {
                    // Out of blind retries; escalate to the ambiguous path.
                    tracing::warn!(attempt = self.attempt, reason, "transient retry budget exhausted");
                    AttemptOutcome::Reconcile
                }
            }
            GatewayError::Ambiguous(reason) => {
                tracing::warn!(attempt = self.attempt, reason, "ambiguous gateway state, reconciling");
                AttemptOutcome::Reconcile
            }
            GatewayError::Rejected(reason) => AttemptOutcome::Fail {
                reason: reason.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn transient_retries_until_budget_then_reconciles() {
        let mut attempt = OrderAttempt::new(policy());
        let err = GatewayError::transient("timeout");
        assert!(matches!(attempt.on_failure(&err), AttemptOutcome::Retry { .. }));
        assert!(matches!(attempt.on_failure(&err), AttemptOutcome::Retry { .. }));
        // Third failure exhausts max_attempts = 3: no blind retry.
        assert_eq!(attempt.on_failure(&err), AttemptOutcome::Reconcile);
    }

    #[test]
    fn rejected_never_retries() {
        let mut attempt = OrderAttempt::new(policy());
        let outcome = attempt.on_failure(&GatewayError::rejected("insufficient margin"));
        assert!(matches!(outcome, AttemptOutcome::Fail { .. }));
    }

    #[test]
    fn ambiguous_goes_straight_to_reconcile() {
        let mut attempt = OrderAttempt::new(policy());
        let outcome = attempt.on_failure(&GatewayError::ambiguous("connection dropped"));
        assert_eq!(outcome, AttemptOutcome::Reconcile);
    }
}
