//! Subscription store port.
//!
//! Billing mutations are compare-and-set: each one names the state it expects
//! to change and returns `false` when the row has moved on, so a billing
//! outcome is applied to a subscription at most once.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::billing::{BillingError, FailureAction, Subscription};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Stores a new subscription.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the user already has an active or suspended subscription
    async fn insert(&self, subscription: &Subscription) -> Result<(), BillingError>;

    async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<Subscription>, BillingError>;

    /// The user's active or suspended subscription.
    async fn find_live_by_user(&self, user_id: &UserId)
        -> Result<Option<Subscription>, BillingError>;

    /// Active, non-basic subscriptions due at or before `now`, oldest due first.
    async fn find_due(&self, now: Timestamp) -> Result<Vec<Subscription>, BillingError>;

    /// Moves the cycle marker from `expected_cycle` to `next_billing_at` and
    /// clears the failure state.
    async fn advance_cycle(
        &self,
        id: SubscriptionId,
        expected_cycle: Timestamp,
        next_billing_at: Timestamp,
        billed_at: Timestamp,
    ) -> Result<bool, BillingError>;

    /// Applies the failure policy if the subscription is still in the cycle
    /// and failure count the attempt was made for.
    async fn record_failure(
        &self,
        id: SubscriptionId,
        expected_cycle: Timestamp,
        expected_failures: u32,
        action: FailureAction,
        now: Timestamp,
    ) -> Result<bool, BillingError>;

    /// Active → suspended. Returns false if the subscription was not active.
    async fn suspend(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError>;

    /// Suspended → active with `next_billing_at = now`.
    async fn reactivate(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError>;

    /// Active or suspended → cancelled.
    async fn cancel(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError>;

    /// Expires cancelled subscriptions past their paid period and suspended
    /// subscriptions older than `suspended_grace`. Returns the expired ids.
    async fn expire_lapsed(
        &self,
        now: Timestamp,
        suspended_grace: Duration,
    ) -> Result<Vec<SubscriptionId>, BillingError>;
}
