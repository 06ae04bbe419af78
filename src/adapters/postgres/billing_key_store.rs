//! PostgreSQL implementation of BillingKeyStore.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{
    BillingError, BillingKey, BillingToken, CardMeta, KeyStatus, NewBillingKey,
};
use crate::domain::foundation::{BillingKeyId, Timestamp, UserId};
use crate::ports::BillingKeyStore;

use super::{corrupt_row, storage_error, violates};

const TOKEN_CONSTRAINT: &str = "billing_keys_token_key";

pub struct PostgresBillingKeyStore {
    pool: PgPool,
}

impl PostgresBillingKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BillingKeyRow {
    id: Uuid,
    user_id: String,
    token: String,
    masked_card_number: Option<String>,
    card_label: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    deactivated_at: Option<DateTime<Utc>>,
}

impl TryFrom<BillingKeyRow> for BillingKey {
    type Error = BillingError;

    fn try_from(row: BillingKeyRow) -> Result<Self, Self::Error> {
        Ok(BillingKey {
            id: BillingKeyId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt_row("billing_keys", e))?,
            token: BillingToken::new(row.token).map_err(|e| corrupt_row("billing_keys", e))?,
            card: CardMeta {
                masked_number: row.masked_card_number,
                label: row.card_label,
            },
            status: row
                .status
                .parse::<KeyStatus>()
                .map_err(|e| corrupt_row("billing_keys", e))?,
            created_at: Timestamp::from_datetime(row.created_at),
            deactivated_at: row.deactivated_at.map(Timestamp::from_datetime),
        })
    }
}

#[async_trait]
impl BillingKeyStore for PostgresBillingKeyStore {
    async fn get_active_key(&self, user_id: &UserId) -> Result<Option<BillingKey>, BillingError> {
        let row: Option<BillingKeyRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, token, masked_card_number, card_label, status,
                   created_at, deactivated_at
            FROM billing_keys
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to load active billing key", e))?;

        row.map(BillingKey::try_from).transpose()
    }

    async fn register_key(
        &self,
        key: NewBillingKey,
        now: Timestamp,
    ) -> Result<BillingKey, BillingError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to start transaction", e))?;

        // Serializes registrations per user so the swap below cannot interleave.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key.user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to lock user billing keys", e))?;

        sqlx::query(
            r#"
            UPDATE billing_keys
            SET status = 'inactive', deactivated_at = $2
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(key.user_id.as_str())
        .bind(now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to deactivate previous billing key", e))?;

        let registered = BillingKey {
            id: BillingKeyId::new(),
            user_id: key.user_id,
            token: key.token,
            card: key.card,
            status: KeyStatus::Active,
            created_at: now,
            deactivated_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO billing_keys (
                id, user_id, token, masked_card_number, card_label, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(registered.id.as_uuid())
        .bind(registered.user_id.as_str())
        .bind(registered.token.expose())
        .bind(&registered.card.masked_number)
        .bind(&registered.card.label)
        .bind(registered.status.as_str())
        .bind(registered.created_at.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if violates(&e, TOKEN_CONSTRAINT) {
                return BillingError::conflict("billing token already registered");
            }
            storage_error("Failed to insert billing key", e)
        })?;

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit transaction", e))?;

        Ok(registered)
    }

    async fn deactivate_key(&self, user_id: &UserId, now: Timestamp) -> Result<bool, BillingError> {
        let result = sqlx::query(
            r#"
            UPDATE billing_keys
            SET status = 'inactive', deactivated_at = $2
            WHERE user_id = $1 AND status = 'active'
            "#,
        )
        .bind(user_id.as_str())
        .bind(now.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to deactivate billing key", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> BillingKeyRow {
        BillingKeyRow {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            token: "BILLKEY1".into(),
            masked_card_number: Some("4111********1111".into()),
            card_label: Some("VISA".into()),
            status: status.into(),
            created_at: Utc::now(),
            deactivated_at: None,
        }
    }

    #[test]
    fn converts_valid_row() {
        let key = BillingKey::try_from(row("active")).unwrap();
        assert!(key.is_active());
        assert_eq!(key.token.expose(), "BILLKEY1");
        assert_eq!(key.card.label.as_deref(), Some("VISA"));
    }

    #[test]
    fn unknown_status_is_storage_error() {
        let err = BillingKey::try_from(row("revoked")).unwrap_err();
        assert!(matches!(err, BillingError::Storage(_)));
    }
}
