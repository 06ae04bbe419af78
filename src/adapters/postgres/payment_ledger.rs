//! PostgreSQL implementation of PaymentLedger.
//!
//! Rows are never deleted. The unique constraint on `order_ref` is what makes
//! a second attempt for the same cycle fail with `Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{
    AttemptOutcome, AttemptResult, BillingError, NewAttempt, OrderReference, PaymentAttempt,
};
use crate::domain::foundation::{AttemptId, SubscriptionId, Timestamp, UserId};
use crate::ports::PaymentLedger;

use super::{corrupt_row, storage_error, violates};

const ORDER_REF_CONSTRAINT: &str = "payment_attempts_order_ref_key";

const SELECT_ATTEMPT: &str = r#"
    SELECT id, order_ref, subscription_id, user_id, amount, outcome,
           transaction_id, raw_response, created_at, finalized_at
    FROM payment_attempts
"#;

pub struct PostgresPaymentLedger {
    pool: PgPool,
}

impl PostgresPaymentLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    id: Uuid,
    order_ref: String,
    subscription_id: Uuid,
    user_id: String,
    amount: i64,
    outcome: String,
    transaction_id: Option<String>,
    raw_response: Option<String>,
    created_at: DateTime<Utc>,
    finalized_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for PaymentAttempt {
    type Error = BillingError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(PaymentAttempt {
            id: AttemptId::from_uuid(row.id),
            order_ref: row
                .order_ref
                .parse::<OrderReference>()
                .map_err(|e| corrupt_row("payment_attempts", e))?,
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt_row("payment_attempts", e))?,
            amount: row.amount,
            outcome: row
                .outcome
                .parse::<AttemptOutcome>()
                .map_err(|e| corrupt_row("payment_attempts", e))?,
            transaction_id: row.transaction_id,
            raw_response: row.raw_response,
            created_at: Timestamp::from_datetime(row.created_at),
            finalized_at: row.finalized_at.map(Timestamp::from_datetime),
        })
    }
}

fn into_attempts(rows: Vec<AttemptRow>) -> Result<Vec<PaymentAttempt>, BillingError> {
    rows.into_iter().map(PaymentAttempt::try_from).collect()
}

#[async_trait]
impl PaymentLedger for PostgresPaymentLedger {
    async fn record_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, BillingError> {
        let row = PaymentAttempt::pending(attempt);

        sqlx::query(
            r#"
            INSERT INTO payment_attempts (
                id, order_ref, subscription_id, user_id, amount, outcome, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.id.as_uuid())
        .bind(row.order_ref.to_string())
        .bind(row.subscription_id.as_uuid())
        .bind(row.user_id.as_str())
        .bind(row.amount)
        .bind(row.outcome.as_str())
        .bind(row.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if violates(&e, ORDER_REF_CONSTRAINT) {
                return BillingError::conflict(format!(
                    "order reference {} already recorded",
                    row.order_ref
                ));
            }
            storage_error("Failed to record payment attempt", e)
        })?;

        Ok(row.id)
    }

    async fn finalize_attempt(
        &self,
        attempt_id: AttemptId,
        result: AttemptResult,
        at: Timestamp,
    ) -> Result<(), BillingError> {
        if result.outcome == AttemptOutcome::Pending {
            return Err(BillingError::InvalidState(
                "an attempt cannot be finalized as pending".into(),
            ));
        }

        let updated = sqlx::query(
            r#"
            UPDATE payment_attempts
            SET outcome = $2, transaction_id = $3, raw_response = $4, finalized_at = $5
            WHERE id = $1 AND outcome = 'pending'
            "#,
        )
        .bind(attempt_id.as_uuid())
        .bind(result.outcome.as_str())
        .bind(&result.transaction_id)
        .bind(&result.raw_response)
        .bind(at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to finalize payment attempt", e))?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let exists: Option<(String,)> =
            sqlx::query_as("SELECT outcome FROM payment_attempts WHERE id = $1")
                .bind(attempt_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to load payment attempt", e))?;

        match exists {
            Some(_) => Err(BillingError::conflict(format!(
                "payment attempt {} already finalized",
                attempt_id
            ))),
            None => Err(BillingError::not_found("payment attempt", attempt_id)),
        }
    }

    async fn find_by_order_ref(
        &self,
        order_ref: &OrderReference,
    ) -> Result<Option<PaymentAttempt>, BillingError> {
        let row: Option<AttemptRow> =
            sqlx::query_as(&format!("{} WHERE order_ref = $1", SELECT_ATTEMPT))
                .bind(order_ref.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to look up order reference", e))?;

        row.map(PaymentAttempt::try_from).transpose()
    }

    async fn find_stale_pending(
        &self,
        recorded_before: Timestamp,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "{} WHERE outcome = 'pending' AND created_at < $1 ORDER BY created_at",
            SELECT_ATTEMPT
        ))
        .bind(recorded_before.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list pending attempts", e))?;

        into_attempts(rows)
    }

    async fn list_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<Vec<PaymentAttempt>, BillingError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "{} WHERE subscription_id = $1 ORDER BY created_at",
            SELECT_ATTEMPT
        ))
        .bind(subscription_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list payment attempts", e))?;

        into_attempts(rows)
    }
}
