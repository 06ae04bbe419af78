//! In-memory store adapters.
//!
//! Same atomicity as the PostgreSQL adapters: the ledger enforces order
//! reference uniqueness, key registration swaps the active key under one
//! lock, and subscription mutations are compare-and-set. Used by tests and
//! by local runs without a database.

mod billing_key_store;
mod payment_ledger;
mod subscription_store;

pub use billing_key_store::InMemoryBillingKeyStore;
pub use payment_ledger::InMemoryPaymentLedger;
pub use subscription_store::InMemorySubscriptionStore;
