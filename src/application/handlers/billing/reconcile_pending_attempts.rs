//! ReconcilePendingAttemptsHandler - resolves ledger rows stuck in `pending`.
//!
//! A row stays pending only when the process died between recording the
//! attempt and finalizing it. The gateway's order inquiry decides the
//! outcome; the next charge run for the subscription then applies it.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use crate::domain::billing::{AttemptResult, BillingError, PaymentAttempt};
use crate::ports::{Clock, GatewayClient, OrderStatus, PaymentLedger};

#[derive(Debug, Clone, Default)]
pub struct ReconcilePendingAttemptsCommand;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Inquiry failed or the row was finalized concurrently.
    pub unresolved: usize,
}

pub struct ReconcilePendingAttemptsHandler {
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn GatewayClient>,
    clock: Arc<dyn Clock>,
    reconcile_after: Duration,
}

impl ReconcilePendingAttemptsHandler {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn GatewayClient>,
        clock: Arc<dyn Clock>,
        reconcile_after: Duration,
    ) -> Self {
        Self {
            ledger,
            gateway,
            clock,
            reconcile_after,
        }
    }

    pub async fn handle(
        &self,
        _cmd: ReconcilePendingAttemptsCommand,
    ) -> Result<ReconcileSummary, BillingError> {
        let cutoff = self.clock.now().minus(self.reconcile_after);
        let stale = self.ledger.find_stale_pending(cutoff).await?;
        let mut summary = ReconcileSummary {
            examined: stale.len(),
            ..Default::default()
        };

        for attempt in stale {
            match self.resolve(&attempt).await {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    summary.unresolved += 1;
                    tracing::warn!(
                        order_ref = %attempt.order_ref,
                        error = %e,
                        "Pending attempt left unresolved"
                    );
                }
            }
        }

        if summary.examined > 0 {
            tracing::info!(
                examined = summary.examined,
                succeeded = summary.succeeded,
                failed = summary.failed,
                unresolved = summary.unresolved,
                "Reconciled pending attempts"
            );
        }
        Ok(summary)
    }

    /// Returns whether the attempt was finalized as a success.
    async fn resolve(&self, attempt: &PaymentAttempt) -> Result<bool, BillingError> {
        let status = self
            .gateway
            .query_order(&attempt.order_ref, self.clock.now())
            .await?;

        let (result, paid) = match status {
            OrderStatus::Paid { transaction_id } => (
                AttemptResult::success(transaction_id, Some("reconciled: paid".to_string())),
                true,
            ),
            OrderStatus::NotPaid { code, message } => (
                AttemptResult::failed(Some(format!("reconciled: [{}] {}", code, message))),
                false,
            ),
            OrderStatus::Unknown => (
                AttemptResult::failed(Some("reconciled: order unknown to gateway".to_string())),
                false,
            ),
        };

        self.ledger
            .finalize_attempt(attempt.id, result, self.clock.now())
            .await?;
        tracing::info!(order_ref = %attempt.order_ref, paid, "Pending attempt finalized");
        Ok(paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::gateway::MockGatewayClient;
    use crate::adapters::memory::InMemoryPaymentLedger;
    use crate::domain::billing::{AttemptOutcome, NewAttempt, OrderReference};
    use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

    async fn pending(ledger: &InMemoryPaymentLedger, at: Timestamp) -> OrderReference {
        let subscription_id = SubscriptionId::new();
        let order_ref = OrderReference::for_cycle(subscription_id, at, 0);
        ledger
            .record_attempt(NewAttempt {
                order_ref: order_ref.clone(),
                subscription_id,
                user_id: UserId::new("user-1").unwrap(),
                amount: 9_900,
                requested_at: at,
            })
            .await
            .unwrap();
        order_ref
    }

    #[tokio::test]
    async fn paid_unknown_and_fresh_rows() {
        let start = Timestamp::now();
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let gateway = MockGatewayClient::new();
        let clock = ManualClock::new(start.plus(Duration::minutes(30)));

        let paid = pending(&ledger, start).await;
        let unknown = pending(&ledger, start).await;
        let fresh = pending(&ledger, start.plus(Duration::minutes(29))).await;
        gateway.set_order_status(
            &paid,
            OrderStatus::Paid {
                transaction_id: "TID42".into(),
            },
        );

        let handler = ReconcilePendingAttemptsHandler::new(
            ledger.clone(),
            Arc::new(gateway.clone()),
            Arc::new(clock),
            Duration::minutes(10),
        );
        let summary = handler.handle(ReconcilePendingAttemptsCommand).await.unwrap();

        assert_eq!(
            summary,
            ReconcileSummary {
                examined: 2,
                succeeded: 1,
                failed: 1,
                unresolved: 0
            }
        );
        let outcome_of = |r: &OrderReference| {
            let ledger = ledger.clone();
            let r = r.clone();
            async move { ledger.find_by_order_ref(&r).await.unwrap().unwrap() }
        };
        let paid_row = outcome_of(&paid).await;
        assert_eq!(paid_row.outcome, AttemptOutcome::Success);
        assert_eq!(paid_row.transaction_id.as_deref(), Some("TID42"));
        assert_eq!(outcome_of(&unknown).await.outcome, AttemptOutcome::Failed);
        assert_eq!(outcome_of(&fresh).await.outcome, AttemptOutcome::Pending);
    }
}
