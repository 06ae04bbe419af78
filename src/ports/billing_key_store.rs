//! Credential store port - persistence of billing keys.
//!
//! # Design
//!
//! - **One active key per user**: `register_key` deactivates the previous key
//!   and inserts the new one in a single transaction
//! - **Tokens are unique**: registering a known token is a `Conflict`; callers
//!   treat it as "already registered" and re-fetch the active key

use async_trait::async_trait;

use crate::domain::billing::{BillingError, BillingKey, NewBillingKey};
use crate::domain::foundation::{Timestamp, UserId};

#[async_trait]
pub trait BillingKeyStore: Send + Sync {
    /// Returns the user's active key, if any.
    async fn get_active_key(&self, user_id: &UserId) -> Result<Option<BillingKey>, BillingError>;

    /// Atomically deactivates any active key for the user and stores the new
    /// one as active.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the token is already stored
    async fn register_key(
        &self,
        key: NewBillingKey,
        now: Timestamp,
    ) -> Result<BillingKey, BillingError>;

    /// Deactivates the user's active key. Returns false if there was none.
    async fn deactivate_key(&self, user_id: &UserId, now: Timestamp) -> Result<bool, BillingError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_key_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn BillingKeyStore) {}
    }
}
