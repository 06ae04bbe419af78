//! In-memory payment ledger.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{
    AttemptOutcome, AttemptResult, BillingError, NewAttempt, OrderReference, PaymentAttempt,
};
use crate::domain::foundation::{AttemptId, SubscriptionId, Timestamp};
use crate::ports::PaymentLedger;

#[derive(Default)]
struct LedgerState {
    attempts: Vec<PaymentAttempt>,
    by_order_ref: HashMap<String, usize>,
}

/// Append-only ledger with a unique index on the order reference.
#[derive(Default)]
pub struct InMemoryPaymentLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryPaymentLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn all(&self) -> Vec<PaymentAttempt> {
        self.state.read().await.attempts.clone()
    }

    pub async fn count_with_outcome(&self, outcome: AttemptOutcome) -> usize {
        self.state
            .read()
            .await
            .attempts
            .iter()
            .filter(|a| a.outcome == outcome)
            .count()
    }
}

#[async_trait]
impl PaymentLedger for InMemoryPaymentLedger {
    async fn record_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, BillingError> {
        let mut state = self.state.write().await;
        let key = attempt.order_ref.to_string();
        if state.by_order_ref.contains_key(&key) {
            return Err(BillingError::conflict(format!(
                "order reference {} already recorded",
                key
            )));
        }

        let row = PaymentAttempt::pending(attempt);
        let id = row.id;
        let index = state.attempts.len();
        state.attempts.push(row);
        state.by_order_ref.insert(key, index);
        Ok(id)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        result: AttemptResult,
        at: Timestamp,
    ) -> Result<(), BillingError> {
        let mut state = self.state.write().await;
        let attempt = state
            .attempts
            .iter_mut()
            .find(|a| a.id == attempt_id)
            .ok_or_else(|| BillingError::not_found("payment attempt", attempt_id))?;
        attempt.finalize(result, at).map_err(|_| {
            BillingError::conflict(format!("payment attempt {} already finalized", attempt_id))
        })
    }

    async fn find_by_order_ref(
        &self,
        order_ref: &OrderReference,
    ) -> Result<Option<PaymentAttempt>, BillingError> {
        let state = self.state.read().await;
        Ok(state
            .by_order_ref
            .get(&order_ref.to_string())
            .and_then(|&index| state.attempts.get(index))
            .cloned())
    }

    async fn find_stale_pending(
        &self,
        recorded_before: Timestamp,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Pending && a.created_at < recorded_before)
            .cloned()
            .collect())
    }

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .iter()
            .filter(|a| a.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}
