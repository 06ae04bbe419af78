//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers (read).

pub mod handlers;

pub use handlers::billing::{
    ActiveKeyView, BillingPassSummary, CancelSubscriptionCommand, CancelSubscriptionHandler,
    ChargeOutcome, ChargeSettings, ChargeSubscriptionCommand, ChargeSubscriptionHandler,
    CompleteKeyIssuanceCommand, CompleteKeyIssuanceHandler, CompleteKeyIssuanceResult,
    ExpireLapsedSubscriptionsCommand, ExpireLapsedSubscriptionsHandler, GetActiveKeyHandler,
    GetActiveKeyQuery, PrepareKeyIssuanceCommand, PrepareKeyIssuanceHandler,
    PrepareKeyIssuanceResult, ReconcilePendingAttemptsCommand, ReconcilePendingAttemptsHandler,
    ReconcileSummary, RemoveBillingKeyCommand, RemoveBillingKeyHandler, RemoveBillingKeyResult,
    RunBillingPassCommand, RunBillingPassHandler, StartSubscriptionCommand,
    StartSubscriptionHandler,
};
