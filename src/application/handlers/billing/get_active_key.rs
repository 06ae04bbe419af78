//! GetActiveKeyHandler - Query handler for the user's stored card.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, BillingKey};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::BillingKeyStore;

#[derive(Debug, Clone)]
pub struct GetActiveKeyQuery {
    pub user_id: UserId,
}

/// Masked view of the active key. The token itself is never returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveKeyView {
    pub masked_card_number: Option<String>,
    pub card_label: Option<String>,
    pub registered_at: Timestamp,
}

impl From<BillingKey> for ActiveKeyView {
    fn from(key: BillingKey) -> Self {
        Self {
            masked_card_number: key.card.masked_number,
            card_label: key.card.label,
            registered_at: key.created_at,
        }
    }
}

pub struct GetActiveKeyHandler {
    keys: Arc<dyn BillingKeyStore>,
}

impl GetActiveKeyHandler {
    pub fn new(keys: Arc<dyn BillingKeyStore>) -> Self {
        Self { keys }
    }

    pub async fn handle(&self, query: GetActiveKeyQuery) -> Result<ActiveKeyView, BillingError> {
        self.keys
            .get_active_key(&query.user_id)
            .await?
            .map(ActiveKeyView::from)
            .ok_or_else(|| BillingError::not_found("billing key", &query.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryBillingKeyStore;
    use crate::domain::billing::{BillingToken, CardMeta, NewBillingKey};

    #[tokio::test]
    async fn returns_masked_card_only() {
        let keys = Arc::new(InMemoryBillingKeyStore::new());
        let user_id = UserId::new("user-1").unwrap();
        keys.register_key(
            NewBillingKey {
                user_id: user_id.clone(),
                token: BillingToken::new("BILLKEY0001").unwrap(),
                card: CardMeta::new(Some("5409-1234-5678-9012"), Some("SHINHAN")),
            },
            Timestamp::now(),
        )
        .await
        .unwrap();

        let view = GetActiveKeyHandler::new(keys)
            .handle(GetActiveKeyQuery { user_id })
            .await
            .unwrap();

        assert_eq!(view.card_label.as_deref(), Some("SHINHAN"));
        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("BILLKEY0001"));
        assert!(!json.contains("5678"));
    }

    #[tokio::test]
    async fn no_key_is_not_found() {
        let err = GetActiveKeyHandler::new(Arc::new(InMemoryBillingKeyStore::new()))
            .handle(GetActiveKeyQuery {
                user_id: UserId::new("user-1").unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::NotFound { .. }));
    }
}
