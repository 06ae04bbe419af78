//! Payment ledger port - append-only record of charge attempts.
//!
//! The ledger is the idempotency backbone of the engine: an attempt is
//! recorded as `pending` before the gateway is called, and the unique order
//! reference makes a second recording of the same attempt fail with
//! `Conflict`. Rows are never deleted.

use async_trait::async_trait;

use crate::domain::billing::{
    AttemptResult, BillingError, NewAttempt, OrderReference, PaymentAttempt,
};
use crate::domain::foundation::{AttemptId, SubscriptionId, Timestamp};

#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Stores a `pending` attempt.
    ///
    /// # Errors
    ///
    /// - `Conflict` if an attempt with the same order reference exists
    async fn record_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, BillingError>;

    /// Moves a `pending` attempt to its final outcome.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the attempt does not exist
    /// - `Conflict` if the attempt is already finalized
    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        result: AttemptResult,
        at: Timestamp,
    ) -> Result<(), BillingError>;

    async fn find_by_order_ref(
        &self,
        order_ref: &OrderReference,
    ) -> Result<Option<PaymentAttempt>, BillingError>;

    /// Attempts still `pending` that were recorded before `recorded_before`.
    async fn find_stale_pending(
        &self,
        recorded_before: Timestamp,
    ) -> Result<Vec<PaymentAttempt>, BillingError>;

    /// Audit trail for one subscription, oldest first.
    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<PaymentAttempt>, BillingError>;
}
