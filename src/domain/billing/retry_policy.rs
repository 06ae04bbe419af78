//! Failure policy for declined or failed charges.

use chrono::Duration;

use crate::domain::foundation::Timestamp;

/// What to do with a subscription after a failed charge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Try again at `retry_at`; the billing cycle marker is left untouched.
    Retry { failures: u32, retry_at: Timestamp },
    /// Threshold reached, stop billing until the card is re-registered.
    Suspend { failures: u32 },
}

/// Consecutive-failure threshold and backoff between retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_consecutive_failures: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_consecutive_failures: u32, backoff: Duration) -> Self {
        Self {
            max_consecutive_failures: max_consecutive_failures.max(1),
            backoff,
        }
    }

    /// Decides the follow-up for a subscription that had `prior_failures`
    /// consecutive failures before the attempt that just failed.
    pub fn on_failure(&self, prior_failures: u32, now: Timestamp) -> FailureAction {
        let failures = prior_failures.saturating_add(1);
        if failures >= self.max_consecutive_failures {
            FailureAction::Suspend { failures }
        } else {
            FailureAction::Retry {
                failures,
                retry_at: now.plus(self.backoff),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::days(1))
    }
}
