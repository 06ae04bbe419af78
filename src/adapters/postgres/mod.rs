//! PostgreSQL adapters for the billing stores.
//!
//! - `PostgresBillingKeyStore` - billing keys, one active per user
//! - `PostgresPaymentLedger` - append-only attempts, unique order reference
//! - `PostgresSubscriptionStore` - subscriptions with compare-and-set updates
//!
//! Schema lives in `migrations/`.

mod billing_key_store;
mod payment_ledger;
mod subscription_store;

pub use billing_key_store::PostgresBillingKeyStore;
pub use payment_ledger::PostgresPaymentLedger;
pub use subscription_store::PostgresSubscriptionStore;

use crate::domain::billing::BillingError;

fn storage_error(context: &str, e: sqlx::Error) -> BillingError {
    BillingError::storage(format!("{}: {}", context, e))
}

fn violates(e: &sqlx::Error, constraint: &str) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

fn corrupt_row(table: &str, reason: impl std::fmt::Display) -> BillingError {
    BillingError::storage(format!("invalid {} row: {}", table, reason))
}
