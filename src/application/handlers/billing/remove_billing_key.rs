//! RemoveBillingKeyHandler - Command handler for deleting the stored card.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{BillingKeyStore, Clock};

#[derive(Debug, Clone)]
pub struct RemoveBillingKeyCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveBillingKeyResult {
    /// False when there was no active key to remove.
    pub removed: bool,
}

/// Deactivates the user's active key. Idempotent.
///
/// The subscription is left alone; its next due charge finds no key and
/// suspends it.
pub struct RemoveBillingKeyHandler {
    keys: Arc<dyn BillingKeyStore>,
    clock: Arc<dyn Clock>,
}

impl RemoveBillingKeyHandler {
    pub fn new(keys: Arc<dyn BillingKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { keys, clock }
    }

    pub async fn handle(
        &self,
        cmd: RemoveBillingKeyCommand,
    ) -> Result<RemoveBillingKeyResult, BillingError> {
        let removed = self.keys.deactivate_key(&cmd.user_id, self.clock.now()).await?;
        if removed {
            tracing::info!(user_id = %cmd.user_id, "Billing key removed");
        }
        Ok(RemoveBillingKeyResult { removed })
    }
}
