//! End-to-end tests for the billing engine.
//!
//! These tests drive the scheduler and the application handlers against the
//! in-memory stores and the scriptable mock gateway:
//! 1. A card is registered through the issuance callback
//! 2. The scheduler charges due subscriptions on each tick
//! 3. Failures, suspensions and reconciliation are observed through the
//!    ledger, the subscription store and the emitted events

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use recurring_billing::adapters::clock::ManualClock;
use recurring_billing::adapters::gateway::{MockGatewayClient, MockOutcome};
use recurring_billing::adapters::memory::{
    InMemoryBillingKeyStore, InMemoryPaymentLedger, InMemorySubscriptionStore,
};
use recurring_billing::adapters::notifier::RecordingNotifier;
use recurring_billing::application::{
    ChargeOutcome, ChargeSettings, ChargeSubscriptionCommand, ChargeSubscriptionHandler,
    CompleteKeyIssuanceCommand, CompleteKeyIssuanceHandler, ExpireLapsedSubscriptionsHandler,
    ReconcilePendingAttemptsHandler, RunBillingPassHandler, StartSubscriptionCommand,
    StartSubscriptionHandler,
};
use recurring_billing::domain::billing::{
    AttemptOutcome, BillingToken, CardMeta, ChargePurpose, NewAttempt, NewBillingKey, PlanTier,
    Subscription, SubscriptionStatus,
};
use recurring_billing::domain::foundation::{Timestamp, UserId};
use recurring_billing::ports::{
    BillingKeyStore, Clock, OrderStatus, PaymentLedger, SubscriptionStore,
};
use recurring_billing::scheduler::{BillingScheduler, TickOutcome, TickReport, TickSchedule};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Engine {
    clock: ManualClock,
    subscriptions: Arc<InMemorySubscriptionStore>,
    keys: Arc<InMemoryBillingKeyStore>,
    ledger: Arc<InMemoryPaymentLedger>,
    gateway: MockGatewayClient,
    notifier: Arc<RecordingNotifier>,
    charge: Arc<ChargeSubscriptionHandler>,
    scheduler: Arc<BillingScheduler>,
}

fn march_15() -> Timestamp {
    Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 3, 15, 2, 0, 0).unwrap())
}

fn user() -> UserId {
    UserId::new("user-42").unwrap()
}

impl Engine {
    fn new() -> Self {
        let clock = ManualClock::new(march_15());
        let subscriptions = Arc::new(InMemorySubscriptionStore::new());
        let keys = Arc::new(InMemoryBillingKeyStore::new());
        let ledger = Arc::new(InMemoryPaymentLedger::new());
        let gateway = MockGatewayClient::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());

        let charge = Arc::new(ChargeSubscriptionHandler::new(
            subscriptions.clone(),
            keys.clone(),
            ledger.clone(),
            Arc::new(gateway.clone()),
            notifier.clone(),
            shared_clock.clone(),
            ChargeSettings::default(),
        ));
        let scheduler = Arc::new(BillingScheduler::new(
            Arc::new(RunBillingPassHandler::new(
                subscriptions.clone(),
                charge.clone(),
                shared_clock.clone(),
                std::time::Duration::ZERO,
            )),
            Arc::new(ExpireLapsedSubscriptionsHandler::new(
                subscriptions.clone(),
                shared_clock.clone(),
                Duration::days(30),
            )),
            Arc::new(ReconcilePendingAttemptsHandler::new(
                ledger.clone(),
                Arc::new(gateway.clone()),
                shared_clock.clone(),
                Duration::minutes(10),
            )),
            shared_clock,
            TickSchedule::Daily { hour_utc: 2 },
        ));

        Self {
            clock,
            subscriptions,
            keys,
            ledger,
            gateway,
            notifier,
            charge,
            scheduler,
        }
    }

    async fn start(&self, plan: PlanTier) -> Subscription {
        StartSubscriptionHandler::new(self.subscriptions.clone(), Arc::new(self.clock.clone()))
            .handle(StartSubscriptionCommand {
                user_id: user(),
                plan,
                price: None,
                first_billing_at: Some(self.clock.now()),
            })
            .await
            .unwrap()
    }

    async fn register_card(&self, token: &str) {
        self.gateway.set_issued_key(token, "4111222233334444");
        CompleteKeyIssuanceHandler::new(
            Arc::new(self.gateway.clone()),
            self.keys.clone(),
            self.subscriptions.clone(),
            self.notifier.clone(),
            Arc::new(self.clock.clone()),
        )
        .handle(CompleteKeyIssuanceCommand {
            result_code: "0000".to_string(),
            result_message: "OK".to_string(),
            order_ref: format!("billauth_{}_{}", self.clock.now().epoch_millis(), user()),
            auth_token: Some("AUTH-TOKEN".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    }

    async fn tick(&self) -> TickReport {
        match self.scheduler.try_tick().await.unwrap() {
            TickOutcome::Completed(report) => report,
            TickOutcome::Skipped => panic!("tick unexpectedly skipped"),
        }
    }

    async fn reload(&self, sub: &Subscription) -> Subscription {
        self.subscriptions.find_by_id(sub.id).await.unwrap().unwrap()
    }
}

// =============================================================================
// Scheduled Charging
// =============================================================================

#[tokio::test]
async fn pro_subscription_is_charged_and_advanced_one_month() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-PRO-1").await;
    let sub = engine.start(PlanTier::Pro).await;

    let report = engine.tick().await;

    assert_eq!(report.pass.charged, 1);
    let calls = engine.gateway.calls();
    assert_eq!(calls.len(), 2, "one issuance, one charge");
    assert_eq!(calls[1].method, "charge");
    assert_eq!(calls[1].amount, Some(9_900));
    assert!(calls[1].order_ref.starts_with("charge_"));

    let stored = engine.reload(&sub).await;
    let expected = Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 4, 15, 2, 0, 0).unwrap());
    assert_eq!(stored.next_billing_at, Some(expected));
    assert_eq!(stored.last_billed_at, Some(march_15()));
    assert_eq!(engine.notifier.count("billing.charge_succeeded"), 1);

    // Nothing further is due until the next cycle.
    engine.clock.advance(Duration::days(1));
    assert_eq!(engine.tick().await.pass.due, 0);
}

#[tokio::test]
async fn basic_plan_is_never_charged() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-BASIC").await;
    engine.start(PlanTier::Basic).await;

    let report = engine.tick().await;

    assert_eq!(report.pass.due, 0);
    assert!(!engine.gateway.was_called("charge"));
}

#[tokio::test]
async fn one_time_token_suspends_without_gateway_call() {
    let engine = Engine::new();
    engine
        .keys
        .register_key(
            NewBillingKey {
                user_id: user(),
                token: BillingToken::new("StdpayCARDxyz123").unwrap(),
                card: CardMeta::default(),
            },
            engine.clock.now(),
        )
        .await
        .unwrap();
    let sub = engine.start(PlanTier::Pro).await;

    let report = engine.tick().await;

    assert_eq!(report.pass.suspended, 1);
    assert!(!engine.gateway.was_called("charge"));
    assert!(engine.ledger.all().await.is_empty());
    assert_eq!(engine.reload(&sub).await.status, SubscriptionStatus::Suspended);
    assert_eq!(engine.notifier.count("billing.subscription_suspended"), 1);
}

#[tokio::test]
async fn missing_key_suspends_and_leaves_due_list() {
    let engine = Engine::new();
    let sub = engine.start(PlanTier::Business).await;

    engine.tick().await;

    assert_eq!(engine.reload(&sub).await.status, SubscriptionStatus::Suspended);
    let due = engine
        .subscriptions
        .find_due(engine.clock.now().plus_days(60))
        .await
        .unwrap();
    assert!(due.is_empty());
    assert!(!engine.gateway.was_called("charge"));
}

// =============================================================================
// Failures and Recovery
// =============================================================================

#[tokio::test]
async fn three_failures_suspend_then_new_card_resumes_billing() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-OLD").await;
    let sub = engine.start(PlanTier::Pro).await;
    engine.gateway.set_fallback(MockOutcome::decline("51", "insufficient funds"));

    for _ in 0..3 {
        engine.tick().await;
        engine.clock.advance(Duration::days(1));
    }

    let stored = engine.reload(&sub).await;
    assert_eq!(stored.status, SubscriptionStatus::Suspended);
    assert_eq!(engine.gateway.call_count("charge"), 3);
    let purposes: Vec<ChargePurpose> = engine
        .ledger
        .all()
        .await
        .iter()
        .map(|a| a.order_ref.purpose())
        .collect();
    assert_eq!(
        purposes,
        vec![
            ChargePurpose::Charge,
            ChargePurpose::Retry(1),
            ChargePurpose::Retry(2)
        ]
    );
    assert_eq!(engine.ledger.count_with_outcome(AttemptOutcome::Failed).await, 3);
    assert_eq!(engine.notifier.count("billing.charge_failed"), 3);
    assert_eq!(engine.notifier.count("billing.subscription_suspended"), 1);

    // A suspended subscription is not retried.
    engine.tick().await;
    assert_eq!(engine.gateway.call_count("charge"), 3);

    // Registering a new card reactivates it and the next tick bills.
    engine.gateway.set_fallback(MockOutcome::Approve);
    engine.register_card("BILLKEY-NEW").await;
    assert_eq!(engine.reload(&sub).await.status, SubscriptionStatus::Active);

    let report = engine.tick().await;

    assert_eq!(report.pass.charged, 1);
    let stored = engine.reload(&sub).await;
    assert_eq!(stored.consecutive_failures, 0);
    assert_eq!(stored.retry_at, None);
}

#[tokio::test]
async fn invalid_key_is_deactivated_and_subscription_suspended() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-REVOKED").await;
    let sub = engine.start(PlanTier::Premium).await;
    engine.gateway.push_outcome(MockOutcome::InvalidKey);

    engine.tick().await;

    assert_eq!(engine.reload(&sub).await.status, SubscriptionStatus::Suspended);
    assert!(engine.keys.get_active_key(&user()).await.unwrap().is_none());
}

// =============================================================================
// Idempotency
// =============================================================================

#[tokio::test]
async fn concurrent_charges_hit_gateway_once() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-RACE").await;
    let sub = engine.start(PlanTier::Pro).await;
    engine.gateway.set_delay(std::time::Duration::from_millis(30));

    let (a, b, c) = tokio::join!(
        engine.charge.handle(ChargeSubscriptionCommand {
            subscription_id: sub.id
        }),
        engine.charge.handle(ChargeSubscriptionCommand {
            subscription_id: sub.id
        }),
        engine.charge.handle(ChargeSubscriptionCommand {
            subscription_id: sub.id
        }),
    );

    let charged = [a.unwrap(), b.unwrap(), c.unwrap()]
        .into_iter()
        .filter(|o| matches!(o, ChargeOutcome::Charged { .. }))
        .count();
    assert_eq!(charged, 1);
    assert_eq!(engine.gateway.call_count("charge"), 1);
    assert_eq!(engine.ledger.count_with_outcome(AttemptOutcome::Success).await, 1);
}

#[tokio::test]
async fn overlapping_ticks_charge_once() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-TICK").await;
    engine.start(PlanTier::Pro).await;
    engine.gateway.set_delay(std::time::Duration::from_millis(30));

    let (first, second) = tokio::join!(engine.scheduler.try_tick(), engine.scheduler.try_tick());

    let skipped = [first.unwrap(), second.unwrap()]
        .iter()
        .filter(|o| matches!(o, TickOutcome::Skipped))
        .count();
    assert_eq!(skipped, 1);
    assert_eq!(engine.gateway.call_count("charge"), 1);
}

#[tokio::test]
async fn repeated_registration_leaves_one_active_key() {
    let engine = Engine::new();

    for n in 0..5 {
        engine.register_card(&format!("BILLKEY-{}", n)).await;
        engine.clock.advance(Duration::seconds(1));
    }

    let keys = engine.keys.keys_for(&user()).await;
    assert_eq!(keys.len(), 5);
    let active: Vec<_> = keys.iter().filter(|k| k.is_active()).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].token.expose(), "BILLKEY-4");
    assert_eq!(engine.notifier.count("billing.key_registered"), 5);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn stale_pending_attempt_is_reconciled_and_applied() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-CRASH").await;
    let sub = engine.start(PlanTier::Pro).await;

    // Simulate a crash after the attempt was recorded but before the reply.
    let order_ref = sub.current_order_reference().unwrap();
    engine
        .ledger
        .record_attempt(NewAttempt {
            order_ref: order_ref.clone(),
            subscription_id: sub.id,
            user_id: user(),
            amount: sub.price,
            requested_at: engine.clock.now(),
        })
        .await
        .unwrap();
    engine.gateway.set_order_status(
        &order_ref,
        OrderStatus::Paid {
            transaction_id: "TID-RECOVERED".to_string(),
        },
    );
    engine.clock.advance(Duration::minutes(30));

    let report = engine.tick().await;

    assert_eq!(report.reconciled.succeeded, 1);
    assert!(!engine.gateway.was_called("charge"));
    let row = engine
        .ledger
        .find_by_order_ref(&order_ref)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.outcome, AttemptOutcome::Success);
    assert_eq!(row.transaction_id.as_deref(), Some("TID-RECOVERED"));
    let stored = engine.reload(&sub).await;
    assert_eq!(
        stored.next_billing_at,
        Some(Timestamp::from_datetime(
            Utc.with_ymd_and_hms(2024, 4, 15, 2, 0, 0).unwrap()
        ))
    );
}

#[tokio::test]
async fn fresh_pending_attempt_blocks_a_second_charge() {
    let engine = Engine::new();
    engine.register_card("BILLKEY-INFLIGHT").await;
    let sub = engine.start(PlanTier::Pro).await;
    engine
        .ledger
        .record_attempt(NewAttempt {
            order_ref: sub.current_order_reference().unwrap(),
            subscription_id: sub.id,
            user_id: user(),
            amount: sub.price,
            requested_at: engine.clock.now(),
        })
        .await
        .unwrap();

    let report = engine.tick().await;

    assert_eq!(report.reconciled.examined, 0);
    assert_eq!(report.pass.already_handled, 1);
    assert!(!engine.gateway.was_called("charge"));
    assert_eq!(engine.reload(&sub).await.next_billing_at, Some(march_15()));
}
