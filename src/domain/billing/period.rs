//! Billing period arithmetic.

use chrono::Duration;

use crate::domain::foundation::{Timestamp, ValidationError};

/// Length of one billing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingPeriod {
    /// One calendar month.
    Monthly,
    /// Fixed number of minutes (accelerated test cadence).
    Minutes(u32),
}

impl BillingPeriod {
    /// Returns the start of the cycle following the one that starts at `prior`.
    ///
    /// Always computed from the prior cycle start, never from "now", so a
    /// late tick does not shift the schedule.
    pub fn advance(&self, prior: Timestamp) -> Result<Timestamp, ValidationError> {
        match self {
            BillingPeriod::Monthly => prior.checked_add_months(1).ok_or_else(|| {
                ValidationError::invalid_format("next_billing_at", "billing date overflow")
            }),
            BillingPeriod::Minutes(minutes) => Ok(prior.plus(Duration::minutes(i64::from(*minutes)))),
        }
    }
}
