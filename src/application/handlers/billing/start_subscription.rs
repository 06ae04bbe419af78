//! StartSubscriptionHandler - Command handler for upgrading to a paid plan.

use std::sync::Arc;

use crate::domain::billing::{BillingError, PlanTier, Subscription};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{Clock, SubscriptionStore};

/// Command to start a subscription.
#[derive(Debug, Clone)]
pub struct StartSubscriptionCommand {
    pub user_id: UserId,
    pub plan: PlanTier,
    /// Overrides the plan's list price.
    pub price: Option<i64>,
    /// First cycle start. Defaults to now, so the next tick charges it.
    pub first_billing_at: Option<Timestamp>,
}

/// Handler for starting subscriptions.
///
/// A user has at most one live (active or suspended) subscription; a second
/// start is a `Conflict`.
pub struct StartSubscriptionHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
}

impl StartSubscriptionHandler {
    pub fn new(subscriptions: Arc<dyn SubscriptionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            subscriptions,
            clock,
        }
    }

    pub async fn handle(&self, cmd: StartSubscriptionCommand) -> Result<Subscription, BillingError> {
        let now = self.clock.now();

        let subscription = Subscription::create(
            cmd.user_id,
            cmd.plan,
            cmd.price,
            cmd.first_billing_at.unwrap_or(now),
            now,
        )?;
        self.subscriptions.insert(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            plan = subscription.plan.as_str(),
            price = subscription.price,
            "Subscription started"
        );
        Ok(subscription)
    }
}
