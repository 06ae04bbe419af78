//! In-memory subscription store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, FailureAction, Subscription, SubscriptionStatus};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionStore;

/// Subscriptions keyed by id. Each compare-and-set runs under the write lock.
#[derive(Default)]
pub struct InMemorySubscriptionStore {
    rows: RwLock<HashMap<SubscriptionId, Subscription>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `change` if `guard` accepts the current row.
    async fn compare_and_set<G, F>(&self, id: SubscriptionId, guard: G, change: F) -> Result<bool, BillingError>
    where
        G: FnOnce(&Subscription) -> bool + Send,
        F: FnOnce(&mut Subscription) -> Result<(), BillingError> + Send,
    {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if !guard(row) {
            return Ok(false);
        }
        let mut updated = row.clone();
        change(&mut updated)?;
        *row = updated;
        Ok(true)
    }
}

fn is_live(status: SubscriptionStatus) -> bool {
    matches!(status, SubscriptionStatus::Active | SubscriptionStatus::Suspended)
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), BillingError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&subscription.id) {
            return Err(BillingError::conflict(format!(
                "subscription {} already exists",
                subscription.id
            )));
        }
        if rows
            .values()
            .any(|s| s.user_id == subscription.user_id && is_live(s.status))
        {
            return Err(BillingError::conflict(format!(
                "user {} already has a live subscription",
                subscription.user_id
            )));
        }
        rows.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<Subscription>, BillingError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_live_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, BillingError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|s| &s.user_id == user_id && is_live(s.status))
            .cloned())
    }

    async fn find_due(&self, now: Timestamp) -> Result<Vec<Subscription>, BillingError> {
        let mut due: Vec<Subscription> = self
            .rows
            .read()
            .await
            .values()
            .filter(|s| s.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|s| s.due_at());
        Ok(due)
    }

    async fn advance_cycle(
        &self,
        id: SubscriptionId,
        expected_cycle: Timestamp,
        next_billing_at: Timestamp,
        billed_at: Timestamp,
    ) -> Result<bool, BillingError> {
        self.compare_and_set(
            id,
            |s| s.status == SubscriptionStatus::Active && s.next_billing_at == Some(expected_cycle),
            |s| {
                s.next_billing_at = Some(next_billing_at);
                s.retry_at = None;
                s.consecutive_failures = 0;
                s.last_billed_at = Some(billed_at);
                s.updated_at = billed_at;
                Ok(())
            },
        )
        .await
    }

    async fn record_failure(
        &self,
        id: SubscriptionId,
        expected_cycle: Timestamp,
        expected_failures: u32,
        action: FailureAction,
        now: Timestamp,
    ) -> Result<bool, BillingError> {
        self.compare_and_set(
            id,
            |s| {
                s.status == SubscriptionStatus::Active
                    && s.next_billing_at == Some(expected_cycle)
                    && s.consecutive_failures == expected_failures
            },
            |s| s.record_failure(action, now),
        )
        .await
    }

    async fn suspend(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError> {
        self.compare_and_set(
            id,
            |s| s.status == SubscriptionStatus::Active,
            |s| s.suspend(now),
        )
        .await
    }

    async fn reactivate(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError> {
        self.compare_and_set(
            id,
            |s| s.status == SubscriptionStatus::Suspended,
            |s| s.reactivate(now),
        )
        .await
    }

    async fn cancel(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError> {
        self.compare_and_set(id, |s| is_live(s.status), |s| s.cancel(now))
            .await
    }

    async fn expire_lapsed(
        &self,
        now: Timestamp,
        suspended_grace: Duration,
    ) -> Result<Vec<SubscriptionId>, BillingError> {
        let mut rows = self.rows.write().await;
        let mut expired = Vec::new();
        for row in rows.values_mut().filter(|s| s.has_lapsed(now, suspended_grace)) {
            row.expire(now)?;
            expired.push(row.id);
        }
        Ok(expired)
    }
}
