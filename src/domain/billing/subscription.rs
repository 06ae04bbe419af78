//! Subscription aggregate.
//!
//! A subscription identifies a paying user, its plan and price, and the
//! instant the next billing cycle starts. It is owned by the user entity
//! (one live subscription per user) and is never hard-deleted.
//!
//! # Design Decisions
//!
//! - **Money in minor units**: prices are `i64`, never floats
//! - **Cycle marker**: `next_billing_at` only moves on success, by exactly one
//!   period from its prior value
//! - **Retries**: failures set `retry_at`, leaving the cycle marker alone

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{StateMachine, SubscriptionId, Timestamp, UserId, ValidationError};

use super::{BillingError, BillingPeriod, FailureAction, OrderReference, PlanTier, SubscriptionStatus};

/// Subscription aggregate.
///
/// # Invariants
///
/// - `Basic` subscriptions have no `next_billing_at` and are never due
/// - `consecutive_failures` is 0 whenever `retry_at` is `None` and the
///   subscription is active
/// - status changes follow [`SubscriptionStatus`] transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan: PlanTier,
    /// Monthly price in minor currency units.
    pub price: i64,
    pub status: SubscriptionStatus,
    /// Start of the next unpaid billing cycle.
    pub next_billing_at: Option<Timestamp>,
    /// Earlier retry instant after a failed attempt in the current cycle.
    pub retry_at: Option<Timestamp>,
    pub consecutive_failures: u32,
    pub last_billed_at: Option<Timestamp>,
    pub suspended_at: Option<Timestamp>,
    pub cancelled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Subscription {
    /// Creates an active subscription whose first cycle starts at
    /// `first_billing_at`. The plan's list price is used unless `price` is given.
    pub fn create(
        user_id: UserId,
        plan: PlanTier,
        price: Option<i64>,
        first_billing_at: Timestamp,
        now: Timestamp,
    ) -> Result<Self, BillingError> {
        let price = price.unwrap_or_else(|| plan.list_price());
        if plan.is_billable() && price <= 0 {
            return Err(ValidationError::out_of_range("price", 1, i64::MAX, price).into());
        }
        Ok(Self {
            id: SubscriptionId::new(),
            user_id,
            plan,
            price,
            status: SubscriptionStatus::Active,
            next_billing_at: plan.is_billable().then_some(first_billing_at),
            retry_at: None,
            consecutive_failures: 0,
            last_billed_at: None,
            suspended_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Instant the subscription becomes due, if it is billable at all.
    pub fn due_at(&self) -> Option<Timestamp> {
        if !self.status.is_billable() || !self.plan.is_billable() {
            return None;
        }
        self.retry_at.or(self.next_billing_at)
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.due_at().map_or(false, |due| due <= now)
    }

    /// Order reference for the attempt the subscription is currently due for.
    pub fn current_order_reference(&self) -> Option<OrderReference> {
        self.next_billing_at
            .map(|cycle| OrderReference::for_cycle(self.id, cycle, self.consecutive_failures))
    }

    /// Records a successful charge for the current cycle and returns the new
    /// cycle start (prior cycle start + one period).
    pub fn record_success(
        &mut self,
        period: BillingPeriod,
        now: Timestamp,
    ) -> Result<Timestamp, BillingError> {
        self.ensure_active("advance billing cycle")?;
        let prior = self
            .next_billing_at
            .ok_or_else(|| BillingError::InvalidState("subscription has no billing cycle".into()))?;
        let next = period.advance(prior)?;
        self.next_billing_at = Some(next);
        self.retry_at = None;
        self.consecutive_failures = 0;
        self.last_billed_at = Some(now);
        self.updated_at = now;
        Ok(next)
    }

    /// Applies the retry/suspend decision for a failed attempt.
    pub fn record_failure(&mut self, action: FailureAction, now: Timestamp) -> Result<(), BillingError> {
        match action {
            FailureAction::Retry { failures, retry_at } => {
                self.ensure_active("schedule retry")?;
                self.consecutive_failures = failures;
                self.retry_at = Some(retry_at);
                self.updated_at = now;
                Ok(())
            }
            FailureAction::Suspend { failures } => {
                self.consecutive_failures = failures;
                self.suspend(now)
            }
        }
    }

    /// Stops billing until a new key is registered.
    pub fn suspend(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition_to(SubscriptionStatus::Suspended)?;
        self.retry_at = None;
        self.suspended_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Returns a suspended subscription to billing, due immediately.
    pub fn reactivate(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition_to(SubscriptionStatus::Active)?;
        if self.plan.is_billable() {
            self.next_billing_at = Some(now);
        }
        self.retry_at = None;
        self.consecutive_failures = 0;
        self.suspended_at = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition_to(SubscriptionStatus::Cancelled)?;
        self.retry_at = None;
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn expire(&mut self, now: Timestamp) -> Result<(), BillingError> {
        self.transition_to(SubscriptionStatus::Expired)?;
        self.updated_at = now;
        Ok(())
    }

    /// Cancelled subscriptions lapse once their paid period is over;
    /// suspended ones after `suspended_grace`.
    pub fn has_lapsed(&self, now: Timestamp, suspended_grace: Duration) -> bool {
        match self.status {
            SubscriptionStatus::Cancelled => self.next_billing_at.map_or(true, |end| end <= now),
            SubscriptionStatus::Suspended => self
                .suspended_at
                .map_or(false, |since| since.plus(suspended_grace) <= now),
            _ => false,
        }
    }

    fn ensure_active(&self, operation: &str) -> Result<(), BillingError> {
        if self.status.is_billable() {
            Ok(())
        } else {
            Err(BillingError::InvalidState(format!(
                "cannot {} while subscription is {}",
                operation, self.status
            )))
        }
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), BillingError> {
        let current = self.status;
        self.status = current.transition_to(target).map_err(|_| {
            BillingError::InvalidState(format!(
                "cannot move subscription from {} to {}",
                current, target
            ))
        })?;
        Ok(())
    }
}
