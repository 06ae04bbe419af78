//! CancelSubscriptionHandler - Command handler for cancelling subscriptions.

use std::sync::Arc;

use crate::domain::billing::{BillingError, Subscription};
use crate::domain::foundation::UserId;
use crate::ports::{Clock, SubscriptionStore};

/// Command to cancel the user's live subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

/// Handler for cancelling subscriptions.
///
/// Cancellation is terminal for billing. The row stays until the paid period
/// ends and the expiry sweep marks it expired.
pub struct CancelSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
}

impl CancelSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            clock,
        }
    }

    pub async fn handle(&self, cmd: CancelSubscriptionCommand) -> Result<Subscription, BillingError> {
        // 1. Find the live subscription
        let subscription = self
            .subscriptions
            .find_live_by_user(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", &cmd.user_id))?;

        // 2. Cancel through the store's guarded update
        if !self
            .subscriptions
            .cancel(subscription.id, self.clock.now())
            .await?
        {
            return Err(BillingError::InvalidState(format!(
                "subscription {} is no longer live",
                subscription.id
            )));
        }

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %cmd.user_id,
            "Subscription cancelled"
        );

        self.subscriptions
            .find_by_id(subscription.id)
            .await?
            .ok_or_else(|| BillingError::not_found("subscription", subscription.id))
    }
}
