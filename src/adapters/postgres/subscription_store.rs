//! PostgreSQL implementation of SubscriptionStore.
//!
//! Every billing mutation is a single guarded `UPDATE`; `rows_affected() == 0`
//! means the row had already moved on and the caller's outcome is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::domain::billing::{
    BillingError, FailureAction, PlanTier, Subscription, SubscriptionStatus,
};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};
use crate::ports::SubscriptionStore;

use super::{corrupt_row, storage_error, violates};

const ONE_LIVE_PER_USER: &str = "subscriptions_one_live_per_user";
const PRIMARY_KEY: &str = "subscriptions_pkey";

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, user_id, plan, price, status, next_billing_at, retry_at,
           consecutive_failures, last_billed_at, suspended_at, cancelled_at,
           created_at, updated_at
    FROM subscriptions
"#;

pub struct PostgresSubscriptionStore {
    pool: PgPool,
}

impl PostgresSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        clause: &str,
        bind: SubscriptionLookup<'_>,
    ) -> Result<Option<Subscription>, BillingError> {
        let sql = format!("{} WHERE {}", SELECT_SUBSCRIPTION, clause);
        let query = sqlx::query_as::<_, SubscriptionRow>(&sql);
        let query = match bind {
            SubscriptionLookup::Id(id) => query.bind(*id.as_uuid()),
            SubscriptionLookup::User(user_id) => query.bind(user_id.as_str()),
        };
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to load subscription", e))?;
        row.map(Subscription::try_from).transpose()
    }
}

enum SubscriptionLookup<'a> {
    Id(SubscriptionId),
    User(&'a UserId),
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: String,
    plan: String,
    price: i64,
    status: String,
    next_billing_at: Option<DateTime<Utc>>,
    retry_at: Option<DateTime<Utc>>,
    consecutive_failures: i32,
    last_billed_at: Option<DateTime<Utc>>,
    suspended_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = BillingError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt_row("subscriptions", e))?,
            plan: row
                .plan
                .parse::<PlanTier>()
                .map_err(|e| corrupt_row("subscriptions", e))?,
            price: row.price,
            status: row
                .status
                .parse::<SubscriptionStatus>()
                .map_err(|e| corrupt_row("subscriptions", e))?,
            next_billing_at: row.next_billing_at.map(Timestamp::from_datetime),
            retry_at: row.retry_at.map(Timestamp::from_datetime),
            consecutive_failures: u32::try_from(row.consecutive_failures)
                .map_err(|e| corrupt_row("subscriptions", e))?,
            last_billed_at: row.last_billed_at.map(Timestamp::from_datetime),
            suspended_at: row.suspended_at.map(Timestamp::from_datetime),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn failures_column(failures: u32) -> i32 {
    i32::try_from(failures).unwrap_or(i32::MAX)
}

/// Guarded update for a failed charge. All values are bound by value.
fn failure_update(
    id: SubscriptionId,
    expected_cycle: Timestamp,
    expected_failures: u32,
    action: FailureAction,
    now: Timestamp,
) -> Query<'static, Postgres, PgArguments> {
    match action {
        FailureAction::Retry { failures, retry_at } => sqlx::query(
            r#"
            UPDATE subscriptions
            SET consecutive_failures = $4, retry_at = $5, updated_at = $6
            WHERE id = $1 AND status = 'active'
              AND next_billing_at = $2 AND consecutive_failures = $3
            "#,
        )
        .bind(*id.as_uuid())
        .bind(*expected_cycle.as_datetime())
        .bind(failures_column(expected_failures))
        .bind(failures_column(failures))
        .bind(*retry_at.as_datetime())
        .bind(*now.as_datetime()),
        FailureAction::Suspend { failures } => sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'suspended', consecutive_failures = $4, retry_at = NULL,
                suspended_at = $5, updated_at = $5
            WHERE id = $1 AND status = 'active'
              AND next_billing_at = $2 AND consecutive_failures = $3
            "#,
        )
        .bind(*id.as_uuid())
        .bind(*expected_cycle.as_datetime())
        .bind(failures_column(expected_failures))
        .bind(failures_column(failures))
        .bind(*now.as_datetime()),
    }
}

#[async_trait]
impl SubscriptionStore for PostgresSubscriptionStore {
    async fn insert(&self, subscription: &Subscription) -> Result<(), BillingError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan, price, status, next_billing_at, retry_at,
                consecutive_failures, last_billed_at, suspended_at, cancelled_at,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.user_id.as_str())
        .bind(subscription.plan.as_str())
        .bind(subscription.price)
        .bind(subscription.status.as_str())
        .bind(subscription.next_billing_at.map(|t| *t.as_datetime()))
        .bind(subscription.retry_at.map(|t| *t.as_datetime()))
        .bind(failures_column(subscription.consecutive_failures))
        .bind(subscription.last_billed_at.map(|t| *t.as_datetime()))
        .bind(subscription.suspended_at.map(|t| *t.as_datetime()))
        .bind(subscription.cancelled_at.map(|t| *t.as_datetime()))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, ONE_LIVE_PER_USER) {
                return BillingError::conflict(format!(
                    "user {} already has a live subscription",
                    subscription.user_id
                ));
            }
            if violates(&e, PRIMARY_KEY) {
                return BillingError::conflict(format!(
                    "subscription {} already exists",
                    subscription.id
                ));
            }
            storage_error("Failed to insert subscription", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: SubscriptionId) -> Result<Option<Subscription>, BillingError> {
        self.fetch_one_where("id = $1", SubscriptionLookup::Id(id))
            .await
    }

    async fn find_live_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<Subscription>, BillingError> {
        self.fetch_one_where(
            "user_id = $1 AND status IN ('active', 'suspended')",
            SubscriptionLookup::User(user_id),
        )
        .await
    }

    async fn find_due(&self, now: Timestamp) -> Result<Vec<Subscription>, BillingError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"{}
            WHERE status = 'active'
              AND plan <> 'basic'
              AND COALESCE(retry_at, next_billing_at) <= $1
            ORDER BY COALESCE(retry_at, next_billing_at) ASC"#,
            SELECT_SUBSCRIPTION
        ))
        .bind(now.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list due subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn advance_cycle(
        &self,
        id: SubscriptionId,
        expected_cycle: Timestamp,
        next_billing_at: Timestamp,
        billed_at: Timestamp,
    ) -> Result<bool, BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET next_billing_at = $3,
                retry_at = NULL,
                consecutive_failures = 0,
                last_billed_at = $4,
                updated_at = $4
            WHERE id = $1 AND status = 'active' AND next_billing_at = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_cycle.as_datetime())
        .bind(next_billing_at.as_datetime())
        .bind(billed_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to advance billing cycle", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_failure(
        &self,
        id: SubscriptionId,
        expected_cycle: Timestamp,
        expected_failures: u32,
        action: FailureAction,
        now: Timestamp,
    ) -> Result<bool, BillingError> {
        let query = failure_update(id, expected_cycle, expected_failures, action, now);

        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to record charge failure", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn suspend(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'suspended', retry_at = NULL, suspended_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to suspend subscription", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn reactivate(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'active',
                next_billing_at = CASE WHEN plan <> 'basic' THEN $2 ELSE NULL END,
                retry_at = NULL,
                consecutive_failures = 0,
                suspended_at = NULL,
                updated_at = $2
            WHERE id = $1 AND status = 'suspended'
            "#,
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to reactivate subscription", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, id: SubscriptionId, now: Timestamp) -> Result<bool, BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'cancelled', retry_at = NULL, cancelled_at = $2, updated_at = $2
            WHERE id = $1 AND status IN ('active', 'suspended')
            "#,
        )
        .bind(id.as_uuid())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to cancel subscription", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_lapsed(
        &self,
        now: Timestamp,
        suspended_grace: Duration,
    ) -> Result<Vec<SubscriptionId>, BillingError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET status = 'expired', updated_at = $1
            WHERE (status = 'cancelled' AND (next_billing_at IS NULL OR next_billing_at <= $1))
               OR (status = 'suspended' AND suspended_at <= $2)
            RETURNING id
            "#,
        )
        .bind(now.as_datetime())
        .bind(now.minus(suspended_grace).as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to expire lapsed subscriptions", e))?;

        Ok(rows
            .into_iter()
            .map(|(id,)| SubscriptionId::from_uuid(id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    fn row() -> SubscriptionRow {
        let now = Utc::now();
        SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            plan: "pro".into(),
            price: 9_900,
            status: "active".into(),
            next_billing_at: Some(now),
            retry_at: None,
            consecutive_failures: 2,
            last_billed_at: None,
            suspended_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn converts_valid_row() {
        let sub = Subscription::try_from(row()).unwrap();
        assert_eq!(sub.plan, PlanTier::Pro);
        assert_eq!(sub.consecutive_failures, 2);
        assert!(sub.next_billing_at.is_some());
    }

    #[test]
    fn negative_failure_count_is_storage_error() {
        let err = Subscription::try_from(SubscriptionRow {
            consecutive_failures: -1,
            ..row()
        })
        .unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));
    }

    #[test]
    fn unknown_plan_is_storage_error() {
        let err = Subscription::try_from(SubscriptionRow {
            plan: "enterprise".into(),
            ..row()
        })
        .unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));
    }

    fn cycle() -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }

    #[test]
    fn retry_keeps_subscription_active_and_sets_retry_at() {
        let query = failure_update(
            SubscriptionId::new(),
            cycle(),
            0,
            FailureAction::Retry {
                failures: 1,
                retry_at: cycle().plus_days(1),
            },
            cycle(),
        );
        let sql = query.sql();
        assert!(sql.contains("retry_at = $5"));
        assert!(!sql.contains("'suspended'"));
    }

    #[test]
    fn suspend_clears_retry_and_stamps_suspension() {
        let query = failure_update(
            SubscriptionId::new(),
            cycle(),
            2,
            FailureAction::Suspend { failures: 3 },
            cycle(),
        );
        let sql = query.sql();
        assert!(sql.contains("status = 'suspended'"));
        assert!(sql.contains("retry_at = NULL"));
        assert!(sql.contains("consecutive_failures = $3"));
    }
}
