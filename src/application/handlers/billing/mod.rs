//! Billing handlers.
//!
//! Command and query handlers for the recurring billing engine.
//!
//! ## Commands
//! - Charging one due subscription (the charge orchestrator)
//! - Running a billing pass over all due subscriptions
//! - Starting and cancelling subscriptions
//! - Preparing and completing billing key issuance
//! - Removing the stored billing key
//! - Expiring lapsed subscriptions
//! - Reconciling pending ledger rows
//!
//! ## Queries
//! - Get the active billing key (masked)

mod cancel_subscription;
mod charge_subscription;
mod complete_key_issuance;
mod expire_lapsed_subscriptions;
mod get_active_key;
mod prepare_key_issuance;
mod reconcile_pending_attempts;
mod remove_billing_key;
mod run_billing_pass;
mod start_subscription;

// Commands
pub use cancel_subscription::{CancelSubscriptionCommand, CancelSubscriptionHandler};
pub use charge_subscription::{
    ChargeOutcome, ChargeSettings, ChargeSubscriptionCommand, ChargeSubscriptionHandler,
};
pub use complete_key_issuance::{
    CompleteKeyIssuanceCommand, CompleteKeyIssuanceHandler, CompleteKeyIssuanceResult,
};
pub use expire_lapsed_subscriptions::{
    ExpireLapsedSubscriptionsCommand, ExpireLapsedSubscriptionsHandler,
};
pub use prepare_key_issuance::{
    PrepareKeyIssuanceCommand, PrepareKeyIssuanceHandler, PrepareKeyIssuanceResult,
};
pub use reconcile_pending_attempts::{
    ReconcilePendingAttemptsCommand, ReconcilePendingAttemptsHandler, ReconcileSummary,
};
pub use remove_billing_key::{
    RemoveBillingKeyCommand, RemoveBillingKeyHandler, RemoveBillingKeyResult,
};
pub use run_billing_pass::{BillingPassSummary, RunBillingPassCommand, RunBillingPassHandler};
pub use start_subscription::{StartSubscriptionCommand, StartSubscriptionHandler};

// Queries
pub use get_active_key::{ActiveKeyView, GetActiveKeyHandler, GetActiveKeyQuery};
