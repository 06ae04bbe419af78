//! ChargeSubscriptionHandler - runs one charge attempt for a due subscription.
//!
//! The payment ledger is the synchronization point: an attempt is recorded as
//! `pending` under its deterministic order reference before the gateway is
//! called, and a second caller for the same attempt hits the ledger's unique
//! constraint instead of the gateway. Subscription state only moves through
//! compare-and-set store updates after the ledger row is finalized.

use std::sync::Arc;

use crate::domain::billing::{
    AttemptOutcome, AttemptResult, BillingError, BillingEvent, BillingKey, BillingPeriod,
    FailureAction, NewAttempt, OrderReference, PaymentAttempt, RetryPolicy, Subscription,
    SuspensionReason,
};
use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::ports::{
    BillingKeyStore, Buyer, ChargeRequest, Clock, GatewayClient, Notifier, PaymentLedger,
    SubscriptionStore,
};

/// Command to charge one subscription if it is due.
#[derive(Debug, Clone)]
pub struct ChargeSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

/// What a charge run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The gateway approved; the cycle advanced.
    Charged {
        order_ref: OrderReference,
        transaction_id: String,
        next_billing_at: Timestamp,
    },
    /// The attempt failed and a retry is scheduled.
    Failed {
        order_ref: OrderReference,
        failures: u32,
        retry_at: Timestamp,
    },
    /// Billing stopped until the user registers a new card.
    Suspended { reason: SuspensionReason },
    /// The ledger already holds this attempt; the gateway was not called.
    AlreadyHandled {
        order_ref: OrderReference,
        outcome: AttemptOutcome,
    },
    /// Nothing to do: not due, not active, or changed underneath us.
    Skipped,
}

/// Billing policy applied by the orchestrator.
#[derive(Debug, Clone)]
pub struct ChargeSettings {
    pub period: BillingPeriod,
    pub retry_policy: RetryPolicy,
    pub goods_name_prefix: String,
}

impl Default for ChargeSettings {
    fn default() -> Self {
        Self {
            period: BillingPeriod::Monthly,
            retry_policy: RetryPolicy::default(),
            goods_name_prefix: "Membership".to_string(),
        }
    }
}

/// Handler for charging a subscription.
///
/// Gateway failures never escape as errors: they become a finalized ledger
/// row plus a subscription transition. Only storage failures are returned.
pub struct ChargeSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    keys: Arc<dyn BillingKeyStore>,
    ledger: Arc<dyn PaymentLedger>,
    gateway: Arc<dyn GatewayClient>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: ChargeSettings,
}

impl ChargeSubscriptionHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        keys: Arc<dyn BillingKeyStore>,
        ledger: Arc<dyn PaymentLedger>,
        gateway: Arc<dyn GatewayClient>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: ChargeSettings,
    ) -> Self {
        Self {
            subscriptions,
            keys,
            ledger,
            gateway,
            notifier,
            clock,
            settings,
        }
    }

    pub async fn handle(
        &self,
        cmd: ChargeSubscriptionCommand,
    ) -> Result<ChargeOutcome, BillingError> {
        let now = self.clock.now();

        // 1. Reload; the caller's copy may be stale
        let subscription = self
            .subscriptions
            .find_by_id(cmd.subscription_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", cmd.subscription_id))?;

        if !subscription.is_due(now) {
            return Ok(ChargeOutcome::Skipped);
        }
        let (Some(cycle), Some(order_ref)) = (
            subscription.next_billing_at,
            subscription.current_order_reference(),
        ) else {
            return Ok(ChargeOutcome::Skipped);
        };

        // 2. An attempt already in the ledger is never sent again
        if let Some(existing) = self.ledger.find_by_order_ref(&order_ref).await? {
            return self.resume(&subscription, cycle, existing).await;
        }

        // 3. Preconditions on the stored key
        let Some(key) = self.keys.get_active_key(&subscription.user_id).await? else {
            tracing::warn!(
                subscription_id = %subscription.id,
                user_id = %subscription.user_id,
                "No active billing key for due subscription"
            );
            return self
                .suspend(&subscription, SuspensionReason::MissingBillingKey, now)
                .await;
        };
        if !key.token.kind().is_recurring_capable() {
            tracing::warn!(
                subscription_id = %subscription.id,
                token = %key.token.redacted(),
                "Stored token is one-time only"
            );
            return self
                .suspend(&subscription, SuspensionReason::NotRecurringCapable, now)
                .await;
        }

        // 4. Record pending before any network I/O
        let attempt = NewAttempt {
            order_ref: order_ref.clone(),
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            amount: subscription.price,
            requested_at: now,
        };
        let attempt_id = match self.ledger.record_attempt(attempt).await {
            Ok(id) => id,
            Err(BillingError::Conflict(_)) => {
                tracing::info!(order_ref = %order_ref, "Attempt recorded concurrently, skipping");
                return Ok(ChargeOutcome::AlreadyHandled {
                    order_ref,
                    outcome: AttemptOutcome::Pending,
                });
            }
            Err(e) => return Err(e),
        };

        // 5. Charge
        tracing::info!(
            subscription_id = %subscription.id,
            order_ref = %order_ref,
            amount = subscription.price,
            gateway = self.gateway.name(),
            "Charging subscription"
        );
        let request = self.charge_request(&subscription, &key, order_ref.clone(), now);
        match self.gateway.charge(request).await {
            Ok(receipt) => {
                self.ledger
                    .finalize_attempt(
                        attempt_id,
                        AttemptResult::success(&receipt.transaction_id, Some(receipt.raw_body)),
                        self.clock.now(),
                    )
                    .await?;
                let next_billing_at = self.apply_success(&subscription, cycle, &order_ref).await?;
                Ok(ChargeOutcome::Charged {
                    order_ref,
                    transaction_id: receipt.transaction_id,
                    next_billing_at,
                })
            }
            Err(error) => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    order_ref = %order_ref,
                    error_code = error.code(),
                    error = %error,
                    "Charge failed"
                );
                self.ledger
                    .finalize_attempt(
                        attempt_id,
                        AttemptResult::failed(Some(failure_body(&error))),
                        self.clock.now(),
                    )
                    .await?;

                if error.requires_reregistration() {
                    let reason = match error {
                        BillingError::NotRecurringCapable => SuspensionReason::NotRecurringCapable,
                        _ => SuspensionReason::InvalidBillingKey,
                    };
                    if reason == SuspensionReason::InvalidBillingKey {
                        self.keys
                            .deactivate_key(&subscription.user_id, self.clock.now())
                            .await?;
                    }
                    return self.suspend(&subscription, reason, self.clock.now()).await;
                }

                let (code, message) = failure_code(&error);
                self.apply_failure(&subscription, cycle, &order_ref, code, message)
                    .await
            }
        }
    }

    /// Applies an outcome already present in the ledger.
    async fn resume(
        &self,
        subscription: &Subscription,
        cycle: Timestamp,
        existing: PaymentAttempt,
    ) -> Result<ChargeOutcome, BillingError> {
        tracing::info!(
            subscription_id = %subscription.id,
            order_ref = %existing.order_ref,
            outcome = %existing.outcome,
            "Attempt already in ledger"
        );
        match existing.outcome {
            AttemptOutcome::Pending => {}
            AttemptOutcome::Success => {
                self.apply_success(subscription, cycle, &existing.order_ref)
                    .await?;
            }
            AttemptOutcome::Failed => {
                self.apply_failure(
                    subscription,
                    cycle,
                    &existing.order_ref,
                    "FAILED".to_string(),
                    "charge attempt failed".to_string(),
                )
                .await?;
            }
        }
        Ok(ChargeOutcome::AlreadyHandled {
            order_ref: existing.order_ref,
            outcome: existing.outcome,
        })
    }

    async fn apply_success(
        &self,
        subscription: &Subscription,
        cycle: Timestamp,
        order_ref: &OrderReference,
    ) -> Result<Timestamp, BillingError> {
        let next_billing_at = self.settings.period.advance(cycle)?;
        let advanced = self
            .subscriptions
            .advance_cycle(subscription.id, cycle, next_billing_at, self.clock.now())
            .await?;

        if advanced {
            tracing::info!(
                subscription_id = %subscription.id,
                order_ref = %order_ref,
                next_billing_at = %next_billing_at,
                "Billing cycle advanced"
            );
            self.publish(BillingEvent::ChargeSucceeded {
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                amount: subscription.price,
                order_ref: order_ref.clone(),
                next_billing_at,
            })
            .await;
        } else {
            tracing::debug!(subscription_id = %subscription.id, "Cycle already advanced");
        }
        Ok(next_billing_at)
    }

    async fn apply_failure(
        &self,
        subscription: &Subscription,
        cycle: Timestamp,
        order_ref: &OrderReference,
        code: String,
        message: String,
    ) -> Result<ChargeOutcome, BillingError> {
        let now = self.clock.now();
        let action = self
            .settings
            .retry_policy
            .on_failure(subscription.consecutive_failures, now);

        let applied = self
            .subscriptions
            .record_failure(
                subscription.id,
                cycle,
                subscription.consecutive_failures,
                action,
                now,
            )
            .await?;
        if !applied {
            tracing::debug!(subscription_id = %subscription.id, "Failure already applied");
            return Ok(ChargeOutcome::Skipped);
        }

        let failures = match action {
            FailureAction::Retry { failures, .. } | FailureAction::Suspend { failures } => failures,
        };
        self.publish(BillingEvent::ChargeFailed {
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            order_ref: order_ref.clone(),
            failures,
            code,
            message,
        })
        .await;

        match action {
            FailureAction::Retry { failures, retry_at } => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    failures,
                    retry_at = %retry_at,
                    "Retry scheduled"
                );
                Ok(ChargeOutcome::Failed {
                    order_ref: order_ref.clone(),
                    failures,
                    retry_at,
                })
            }
            FailureAction::Suspend { failures } => {
                let reason = SuspensionReason::RepeatedFailures(failures);
                tracing::warn!(subscription_id = %subscription.id, failures, "Subscription suspended");
                self.publish(BillingEvent::SubscriptionSuspended {
                    subscription_id: subscription.id,
                    user_id: subscription.user_id.clone(),
                    reason,
                })
                .await;
                Ok(ChargeOutcome::Suspended { reason })
            }
        }
    }

    async fn suspend(
        &self,
        subscription: &Subscription,
        reason: SuspensionReason,
        now: Timestamp,
    ) -> Result<ChargeOutcome, BillingError> {
        if !self.subscriptions.suspend(subscription.id, now).await? {
            return Ok(ChargeOutcome::Skipped);
        }
        tracing::warn!(subscription_id = %subscription.id, ?reason, "Subscription suspended");
        self.publish(BillingEvent::SubscriptionSuspended {
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            reason,
        })
        .await;
        Ok(ChargeOutcome::Suspended { reason })
    }

    fn charge_request(
        &self,
        subscription: &Subscription,
        key: &BillingKey,
        order_ref: OrderReference,
        now: Timestamp,
    ) -> ChargeRequest {
        ChargeRequest {
            order_ref,
            amount: subscription.price,
            token: key.token.clone(),
            goods_name: format!(
                "{} {}",
                self.settings.goods_name_prefix,
                subscription.plan.display_name()
            ),
            buyer: Buyer::default(),
            requested_at: now,
        }
    }

    /// Notification failures are logged and never change billing state.
    async fn publish(&self, event: BillingEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            tracing::warn!(
                event_type = event.event_type(),
                error = %e,
                "Failed to deliver billing notification"
            );
        }
    }
}

fn failure_code(error: &BillingError) -> (String, String) {
    match error {
        BillingError::Gateway(e) => (e.code.clone(), e.message.clone()),
        other => (other.code().to_string(), other.to_string()),
    }
}

/// Raw gateway body when there is one, otherwise the normalized error.
fn failure_body(error: &BillingError) -> String {
    match error {
        BillingError::Gateway(e) => e.raw_body.clone().unwrap_or_else(|| e.to_string()),
        other => other.to_string(),
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
    use crate::domain::billing::{
        BillingToken, CardMeta, NewBillingKey, PlanTier, SubscriptionStatus,
    };
    use crate::domain::foundation::UserId;
    use chrono::{DateTime, Duration, Utc};

    // ════════════════════════════════════════════════════════════════════════════
    // Fixture
    // ════════════════════════════════════════════════════════════════════════════

    struct Fixture {
        subscriptions: Arc<InMemorySubscriptionStore>,
        keys: Arc<InMemoryBillingKeyStore>,
        ledger: Arc<InMemoryPaymentLedger>,
        gateway: MockGatewayClient,
        notifier: RecordingNotifier,
        clock: ManualClock,
        handler: ChargeSubscriptionHandler,
    }

    fn at(rfc3339: &str) -> Timestamp {
        Timestamp::from_datetime(
            DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
        )
    }

    fn fixture(now: Timestamp) -> Fixture {
        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        let keys = Arc::new(InMemoryBillingKeyStore::new());
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let gateway = MockGatewayClient::new();
        let notifier = RecordingNotifier::new();
        let clock = ManualClock::new(now);
        let handler = ChargeSubscriptionHandler::new(
            subscriptions.clone(),
            keys.clone(),
            ledger.clone(),
            Arc::new(gateway.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
            ChargeSettings::default(),
        );
        Fixture {
            subscriptions,
            keys,
            ledger,
            gateway,
            notifier,
            clock,
            handler,
        }
    }

    impl Fixture {
        async fn subscription(&self, user: &str, first_billing_at: Timestamp) -> Subscription {
            let sub = Subscription::create(
                UserId::new(user).unwrap(),
                PlanTier::Pro,
                None,
                first_billing_at,
                first_billing_at,
            )
            .unwrap();
            self.subscriptions.insert(&sub).await.unwrap();
            sub
        }

        async fn key(&self, user: &str, token: &str) {
            self.keys
                .register_key(
                    NewBillingKey {
                        user_id: UserId::new(user).unwrap(),
                        token: BillingToken::new(token).unwrap(),
                        card: CardMeta::new(Some("4111111111111111"), Some("VISA")),
                    },
                    self.clock.now(),
                )
                .await
                .unwrap();
        }

        async fn charge(&self, sub: &Subscription) -> ChargeOutcome {
            self.handler
                .handle(ChargeSubscriptionCommand {
                    subscription_id: sub.id,
                })
                .await
                .unwrap()
        }

        async fn reload(&self, sub: &Subscription) -> Subscription {
            self.subscriptions.find_by_id(sub.id).await.unwrap().unwrap()
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success path
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn approved_charge_advances_from_prior_cycle() {
        let cycle = at("2024-05-01T02:00:00Z");
        let f = fixture(cycle.plus(Duration::hours(7)));
        let sub = f.subscription("user-1", cycle).await;
        f.key("user-1", "BILLKEY0001").await;

        let outcome = f.charge(&sub).await;

        let ChargeOutcome::Charged { next_billing_at, .. } = outcome else {
            panic!("expected charge, got {:?}", outcome);
        };
        assert_eq!(next_billing_at, at("2024-06-01T02:00:00Z"));
        let stored = f.reload(&sub).await;
        assert_eq!(stored.next_billing_at, Some(next_billing_at));
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(f.ledger.count_with_outcome(AttemptOutcome::Success).await, 1);
        assert_eq!(f.notifier.count("billing.charge_succeeded"), 1);
    }

    #[tokio::test]
    async fn charge_request_uses_cycle_order_reference_and_price() {
        let cycle = at("2024-05-01T02:00:00Z");
        let f = fixture(cycle);
        let sub = f.subscription("user-1", cycle).await;
        f.key("user-1", "BILLKEY0001").await;

        f.charge(&sub).await;

        let calls = f.gateway.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].order_ref,
            format!("charge_{}_{}", cycle.epoch_millis(), sub.id)
        );
        assert_eq!(calls[0].amount, Some(9_900));
    }

    #[tokio::test]
    async fn not_yet_due_is_skipped() {
        let now = Timestamp::now();
        let f = fixture(now);
        let sub = f.subscription("user-1", now.plus_days(3)).await;
        f.key("user-1", "BILLKEY0001").await;

        assert_eq!(f.charge(&sub).await, ChargeOutcome::Skipped);
        assert!(!f.gateway.was_called("charge"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Preconditions
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn missing_key_suspends_without_ledger_row() {
        let now = Timestamp::now();
        let f = fixture(now);
        let sub = f.subscription("user-1", now.plus_days(-1)).await;

        let outcome = f.charge(&sub).await;

        assert_eq!(
            outcome,
            ChargeOutcome::Suspended {
                reason: SuspensionReason::MissingBillingKey
            }
        );
        assert_eq!(f.reload(&sub).await.status, SubscriptionStatus::Suspended);
        assert!(f.ledger.all().await.is_empty());
        assert_eq!(f.notifier.count("billing.subscription_suspended"), 1);
    }

    #[tokio::test]
    async fn one_time_token_never_reaches_gateway() {
        let now = Timestamp::now();
        let f = fixture(now);
        let sub = f.subscription("user-1", now.plus_days(-1)).await;
        f.key("user-1", "StdpayCARDINIBillTst0001").await;

        let outcome = f.charge(&sub).await;

        assert_eq!(
            outcome,
            ChargeOutcome::Suspended {
                reason: SuspensionReason::NotRecurringCapable
            }
        );
        assert!(f.gateway.calls().is_empty());
        assert!(f.ledger.all().await.is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure policy
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn decline_schedules_retry_and_keeps_cycle() {
        let cycle = at("2024-05-01T02:00:00Z");
        let f = fixture(cycle);
        let sub = f.subscription("user-1", cycle).await;
        f.key("user-1", "BILLKEY0001").await;
        f.gateway.push_outcome(MockOutcome::decline("51", "insufficient funds"));

        let outcome = f.charge(&sub).await;

        assert!(matches!(outcome, ChargeOutcome::Failed { failures: 1, .. }));
        let stored = f.reload(&sub).await;
        assert_eq!(stored.next_billing_at, Some(cycle));
        assert_eq!(stored.retry_at, Some(cycle.plus_days(1)));
        assert_eq!(stored.consecutive_failures, 1);
        assert_eq!(f.ledger.count_with_outcome(AttemptOutcome::Failed).await, 1);
    }

    #[tokio::test]
    async fn third_consecutive_failure_suspends() {
        let cycle = at("2024-05-01T02:00:00Z");
        let f = fixture(cycle);
        let sub = f.subscription("user-1", cycle).await;
        f.key("user-1", "BILLKEY0001").await;
        f.gateway.set_fallback(MockOutcome::Timeout);

        let mut outcomes = Vec::new();
        for _ in 0..3 {
            outcomes.push(f.charge(&sub).await);
            f.clock.advance(Duration::days(1));
        }

        assert!(matches!(outcomes[0], ChargeOutcome::Failed { failures: 1, .. }));
        assert!(matches!(outcomes[1], ChargeOutcome::Failed { failures: 2, .. }));
        assert_eq!(
            outcomes[2],
            ChargeOutcome::Suspended {
                reason: SuspensionReason::RepeatedFailures(3)
            }
        );
        let refs: Vec<String> = f.gateway.calls().into_iter().map(|c| c.order_ref).collect();
        assert!(refs[0].starts_with("charge_"));
        assert!(refs[1].starts_with("retry1_"));
        assert!(refs[2].starts_with("retry2_"));
    }

    #[tokio::test]
    async fn invalid_key_deactivates_and_suspends() {
        let now = Timestamp::now();
        let f = fixture(now);
        let sub = f.subscription("user-1", now.plus_days(-1)).await;
        f.key("user-1", "BILLKEY0001").await;
        f.gateway.push_outcome(MockOutcome::InvalidKey);

        let outcome = f.charge(&sub).await;

        assert_eq!(
            outcome,
            ChargeOutcome::Suspended {
                reason: SuspensionReason::InvalidBillingKey
            }
        );
        assert!(f
            .keys
            .get_active_key(&sub.user_id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(f.ledger.count_with_outcome(AttemptOutcome::Failed).await, 1);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Idempotency
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn second_run_for_same_cycle_does_not_call_gateway() {
        let now = Timestamp::now();
        let f = fixture(now);
        let sub = f.subscription("user-1", now.plus_days(-1)).await;
        f.key("user-1", "BILLKEY0001").await;
        let order_ref = sub.current_order_reference().unwrap();
        f.ledger
            .record_attempt(NewAttempt {
                order_ref: order_ref.clone(),
                subscription_id: sub.id,
                user_id: sub.user_id.clone(),
                amount: sub.price,
                requested_at: now,
            })
            .await
            .unwrap();

        let outcome = f.charge(&sub).await;

        assert_eq!(
            outcome,
            ChargeOutcome::AlreadyHandled {
                order_ref,
                outcome: AttemptOutcome::Pending
            }
        );
        assert!(!f.gateway.was_called("charge"));
    }

    #[tokio::test]
    async fn finalized_success_is_applied_once() {
        let cycle = at("2024-05-01T02:00:00Z");
        let f = fixture(cycle);
        let sub = f.subscription("user-1", cycle).await;
        f.key("user-1", "BILLKEY0001").await;
        let order_ref = sub.current_order_reference().unwrap();
        let id = f
            .ledger
            .record_attempt(NewAttempt {
                order_ref: order_ref.clone(),
                subscription_id: sub.id,
                user_id: sub.user_id.clone(),
                amount: sub.price,
                requested_at: cycle,
            })
            .await
            .unwrap();
        f.ledger
            .finalize_attempt(id, AttemptResult::success("TID1", None), cycle)
            .await
            .unwrap();

        let outcome = f.charge(&sub).await;

        assert!(matches!(
            outcome,
            ChargeOutcome::AlreadyHandled {
                outcome: AttemptOutcome::Success,
                ..
            }
        ));
        assert_eq!(
            f.reload(&sub).await.next_billing_at,
            Some(at("2024-06-01T02:00:00Z"))
        );
        assert!(!f.gateway.was_called("charge"));
        assert_eq!(f.charge(&sub).await, ChargeOutcome::Skipped);
    }

    #[tokio::test]
    async fn concurrent_runs_charge_once() {
        let now = Timestamp::now();
        let f = fixture(now);
        let sub = f.subscription("user-1", now.plus_days(-1)).await;
        f.key("user-1", "BILLKEY0001").await;
        f.gateway.set_delay(std::time::Duration::from_millis(20));

        let (a, b) = tokio::join!(f.charge(&sub), f.charge(&sub));

        let charged = [&a, &b]
            .iter()
            .filter(|o| matches!(o, ChargeOutcome::Charged { .. }))
            .count();
        assert_eq!(charged, 1);
        assert_eq!(f.gateway.call_count("charge"), 1);
        assert_eq!(f.ledger.count_with_outcome(AttemptOutcome::Success).await, 1);
    }
}
