//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing domain and the outside world. Adapters implement these ports.
//!
//! - `BillingKeyStore` - credential store for billing keys
//! - `GatewayClient` - signed exchanges with the card gateway
//! - `PaymentLedger` - append-only charge attempt log
//! - `SubscriptionStore` - subscription state
//! - `Notifier` - one-way user notifications
//! - `Clock` - source of "now"

mod billing_key_store;
mod clock;
mod gateway_client;
mod notifier;
mod payment_ledger;
mod subscription_store;

pub use billing_key_store::BillingKeyStore;
pub use clock::Clock;
pub use gateway_client::{
    is_success_code, Buyer, ChargeReceipt, ChargeRequest, GatewayClient, IssuanceForm, IssuedKey,
    KeyIssuanceRequest, OrderStatus, SUCCESS_CODES,
};
pub use notifier::Notifier;
pub use payment_ledger::PaymentLedger;
pub use subscription_store::SubscriptionStore;
