//! ExpireLapsedSubscriptionsHandler - closes out subscriptions that ended.

use std::sync::Arc;

use chrono::Duration;

use crate::domain::billing::BillingError;
use crate::domain::foundation::SubscriptionId;
use crate::ports::{Clock, SubscriptionStore};

#[derive(Debug, Clone, Default)]
pub struct ExpireLapsedSubscriptionsCommand;

/// Marks cancelled subscriptions whose paid period is over, and suspended
/// ones past `suspended_grace`, as expired.
pub struct ExpireLapsedSubscriptionsHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    clock: Arc<dyn Clock>,
    suspended_grace: Duration,
}

impl ExpireLapsedSubscriptionsHandler {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        clock: Arc<dyn Clock>,
        suspended_grace: Duration,
    ) -> Self {
        Self {
            subscriptions,
            clock,
            suspended_grace,
        }
    }

    pub async fn handle(
        &self,
        _cmd: ExpireLapsedSubscriptionsCommand,
    ) -> Result<Vec<SubscriptionId>, BillingError> {
        let expired = self
            .subscriptions
            .expire_lapsed(self.clock.now(), self.suspended_grace)
            .await?;
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired lapsed subscriptions");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::memory::InMemorySubscriptionStore;
    use crate::domain::billing::{PlanTier, Subscription, SubscriptionStatus};
    use crate::domain::foundation::{Timestamp, UserId};

    #[tokio::test]
    async fn suspended_subscription_expires_after_grace() {
        let start = Timestamp::now();
        let store = Arc::new(InMemorySubscriptionStore::new());
        let clock = ManualClock::new(start);
        let sub = Subscription::create(UserId::new("user-1").unwrap(), PlanTier::Pro, None, start, start)
            .unwrap();
        store.insert(&sub).await.unwrap();
        store.suspend(sub.id, start).await.unwrap();
        let handler = ExpireLapsedSubscriptionsHandler::new(
            store.clone(),
            Arc::new(clock.clone()),
            Duration::days(7),
        );

        clock.advance(Duration::days(6));
        assert!(handler.handle(ExpireLapsedSubscriptionsCommand).await.unwrap().is_empty());

        clock.advance(Duration::days(2));
        assert_eq!(
            handler.handle(ExpireLapsedSubscriptionsCommand).await.unwrap(),
            vec![sub.id]
        );
        let stored = store.find_by_id(sub.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Expired);
    }
}
