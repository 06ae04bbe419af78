//! RunBillingPassHandler - charges every due subscription, one at a time.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::domain::billing::BillingError;
use crate::ports::{Clock, SubscriptionStore};

use super::{ChargeOutcome, ChargeSubscriptionCommand, ChargeSubscriptionHandler};

/// Command to run one billing pass.
#[derive(Debug, Clone, Default)]
pub struct RunBillingPassCommand;

/// Counts per outcome for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillingPassSummary {
    pub due: usize,
    pub charged: usize,
    pub failed: usize,
    pub suspended: usize,
    pub already_handled: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl BillingPassSummary {
    fn record(&mut self, outcome: &ChargeOutcome) {
        match outcome {
            ChargeOutcome::Charged { .. } => self.charged += 1,
            ChargeOutcome::Failed { .. } => self.failed += 1,
            ChargeOutcome::Suspended { .. } => self.suspended += 1,
            ChargeOutcome::AlreadyHandled { .. } => self.already_handled += 1,
            ChargeOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Handler for a billing pass.
///
/// Subscriptions are charged sequentially, oldest due first, with an optional
/// pause between charges. One subscription's error is logged and counted and
/// never stops the pass.
pub struct RunBillingPassHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    charge: Arc<ChargeSubscriptionHandler>,
    clock: Arc<dyn Clock>,
    spacing: Duration,
}

impl RunBillingPassHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        charge: Arc<ChargeSubscriptionHandler>,
        clock: Arc<dyn Clock>,
        spacing: Duration,
    ) -> Self {
        Self {
            subscriptions,
            charge,
            clock,
            spacing,
        }
    }

    pub async fn handle(
        &self,
        _cmd: RunBillingPassCommand,
    ) -> Result<BillingPassSummary, BillingError> {
        let due = self.subscriptions.find_due(self.clock.now()).await?;
        let mut summary = BillingPassSummary {
            due: due.len(),
            ..Default::default()
        };
        tracing::info!(due = summary.due, "Billing pass started");

        for (index, subscription) in due.iter().enumerate() {
            if index > 0 && !self.spacing.is_zero() {
                tokio::time::sleep(self.spacing).await;
            }
            let cmd = ChargeSubscriptionCommand {
                subscription_id: subscription.id,
            };
            match self.charge.handle(cmd).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(
                        subscription_id = %subscription.id,
                        error = %e,
                        "Charge run failed"
                    );
                }
            }
        }

        tracing::info!(
            due = summary.due,
            charged = summary.charged,
            failed = summary.failed,
            suspended = summary.suspended,
            already_handled = summary.already_handled,
            errors = summary.errors,
            "Billing pass finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::gateway::{MockGatewayClient, MockOutcome};
    use crate::adapters::memory::{
        InMemoryBillingKeyStore, InMemoryPaymentLedger, InMemorySubscriptionStore,
    };
    use crate::adapters::notifier::RecordingNotifier;
    use crate::application::handlers::billing::ChargeSettings;
    use crate::domain::billing::{BillingToken, CardMeta, NewBillingKey, PlanTier, Subscription};
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::ports::BillingKeyStore;

    async fn setup(
        now: Timestamp,
    ) -> (RunBillingPassHandler, Arc<InMemorySubscriptionStore>, Arc<InMemoryBillingKeyStore>, MockGatewayClient) {
        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        let keys = Arc::new(InMemoryBillingKeyStore::new());
        let gateway = MockGatewayClient::new();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(now));
        let charge = Arc::new(ChargeSubscriptionHandler::new(
            subscriptions.clone(),
            keys.clone(),
            Arc::new(InMemoryPaymentLedger::new()),
            Arc::new(gateway.clone()),
            Arc::new(RecordingNotifier::new()),
            clock.clone(),
            ChargeSettings::default(),
        ));
        let handler = RunBillingPassHandler::new(subscriptions.clone(), charge, clock, Duration::ZERO);
        (handler, subscriptions, keys, gateway)
    }

    async fn add(
        subscriptions: &InMemorySubscriptionStore,
        keys: &InMemoryBillingKeyStore,
        user: &str,
        token: Option<&str>,
        first_billing_at: Timestamp,
    ) -> Subscription {
        let user_id = UserId::new(user).unwrap();
        let sub = Subscription::create(user_id.clone(), PlanTier::Pro, None, first_billing_at, first_billing_at)
            .unwrap();
        subscriptions.insert(&sub).await.unwrap();
        if let Some(token) = token {
            keys.register_key(
                NewBillingKey {
                    user_id,
                    token: BillingToken::new(token).unwrap(),
                    card: CardMeta::default(),
                },
                first_billing_at,
            )
            .await
            .unwrap();
        }
        sub
    }

    #[tokio::test]
    async fn pass_counts_each_outcome() {
        let now = Timestamp::now();
        let (handler, subscriptions, keys, gateway) = setup(now).await;
        add(&subscriptions, &keys, "paying", Some("BILLKEY0001"), now.plus_days(-2)).await;
        add(&subscriptions, &keys, "declined", Some("BILLKEY0002"), now.plus_days(-1)).await;
        add(&subscriptions, &keys, "no-key", None, now.plus_days(-1)).await;
        add(&subscriptions, &keys, "future", Some("BILLKEY0003"), now.plus_days(5)).await;
        gateway.push_outcome(MockOutcome::Approve);
        gateway.push_outcome(MockOutcome::decline("51", "insufficient funds"));

        let summary = handler.handle(RunBillingPassCommand).await.unwrap();

        assert_eq!(summary.due, 3);
        assert_eq!(summary.charged, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.suspended, 1);
        assert_eq!(summary.errors, 0);
    }

    #[tokio::test]
    async fn oldest_due_is_charged_first() {
        let now = Timestamp::now();
        let (handler, subscriptions, keys, gateway) = setup(now).await;
        let newer = add(&subscriptions, &keys, "newer", Some("BILLKEY0001"), now.plus_days(-1)).await;
        let older = add(&subscriptions, &keys, "older", Some("BILLKEY0002"), now.plus_days(-4)).await;

        handler.handle(RunBillingPassCommand).await.unwrap();

        let calls = gateway.calls();
        assert!(calls[0].order_ref.ends_with(&older.id.to_string()));
        assert!(calls[1].order_ref.ends_with(&newer.id.to_string()));
    }

    #[tokio::test]
    async fn empty_pass_is_a_no_op() {
        let (handler, _, _, gateway) = setup(Timestamp::now()).await;

        let summary = handler.handle(RunBillingPassCommand).await.unwrap();

        assert_eq!(summary, BillingPassSummary::default());
        assert!(gateway.calls().is_empty());
    }
}
