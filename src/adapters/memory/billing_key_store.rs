//! In-memory billing key store.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{BillingError, BillingKey, KeyStatus, NewBillingKey};
use crate::domain::foundation::{BillingKeyId, Timestamp, UserId};
use crate::ports::BillingKeyStore;

/// Billing keys held in a vector; every mutation runs under one write lock,
/// so deactivate-then-insert is atomic.
#[derive(Default)]
pub struct InMemoryBillingKeyStore {
    keys: RwLock<Vec<BillingKey>>,
}

impl InMemoryBillingKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key ever registered for the user, oldest first.
    pub async fn keys_for(&self, user_id: &UserId) -> Vec<BillingKey> {
        self.keys
            .read()
            .await
            .iter()
            .filter(|k| &k.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BillingKeyStore for InMemoryBillingKeyStore {
    async fn get_active_key(&self, user_id: &UserId) -> Result<Option<BillingKey>, BillingError> {
        Ok(self
            .keys
            .read()
            .await
            .iter()
            .find(|k| &k.user_id == user_id && k.is_active())
            .cloned())
    }

    async fn register_key(
        &self,
        key: NewBillingKey,
        now: Timestamp,
    ) -> Result<BillingKey, BillingError> {
        let mut keys = self.keys.write().await;
        if keys.iter().any(|k| k.token == key.token) {
            return Err(BillingError::conflict("billing token already registered"));
        }

        for existing in keys
            .iter_mut()
            .filter(|k| k.user_id == key.user_id && k.is_active())
        {
            existing.status = KeyStatus::Inactive;
            existing.deactivated_at = Some(now);
        }

        let registered = BillingKey {
            id: BillingKeyId::new(),
            user_id: key.user_id,
            token: key.token,
            card: key.card,
            status: KeyStatus::Active,
            created_at: now,
            deactivated_at: None,
        };
        keys.push(registered.clone());
        Ok(registered)
    }

    async fn deactivate_key(&self, user_id: &UserId, now: Timestamp) -> Result<bool, BillingError> {
        let mut keys = self.keys.write().await;
        let mut changed = false;
        for key in keys
            .iter_mut()
            .filter(|k| &k.user_id == user_id && k.is_active())
        {
            key.status = KeyStatus::Inactive;
            key.deactivated_at = Some(now);
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{BillingToken, CardMeta};
    use std::sync::Arc;

    fn new_key(user: &str, token: &str) -> NewBillingKey {
        NewBillingKey {
            user_id: UserId::new(user).unwrap(),
            token: BillingToken::new(token).unwrap(),
            card: CardMeta::new(Some("4111111111111111"), Some("VISA")),
        }
    }

    #[tokio::test]
    async fn register_replaces_active_key() {
        let store = InMemoryBillingKeyStore::new();
        let user = UserId::new("u1").unwrap();

        store.register_key(new_key("u1", "KEY-A"), Timestamp::now()).await.unwrap();
        let second = store.register_key(new_key("u1", "KEY-B"), Timestamp::now()).await.unwrap();

        let active = store.get_active_key(&user).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
        let all = store.keys_for(&user).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all.iter().filter(|k| k.is_active()).count(), 1);
    }

    #[tokio::test]
    async fn duplicate_token_conflicts() {
        let store = InMemoryBillingKeyStore::new();
        store.register_key(new_key("u1", "KEY-A"), Timestamp::now()).await.unwrap();

        let err = store
            .register_key(new_key("u2", "KEY-A"), Timestamp::now())
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::Conflict(_)));
    }

    #[tokio::test]
    async fn deactivate_is_idempotent() {
        let store = InMemoryBillingKeyStore::new();
        let user = UserId::new("u1").unwrap();
        store.register_key(new_key("u1", "KEY-A"), Timestamp::now()).await.unwrap();

        assert!(store.deactivate_key(&user, Timestamp::now()).await.unwrap());
        assert!(!store.deactivate_key(&user, Timestamp::now()).await.unwrap());
        assert!(store.get_active_key(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_registrations_leave_one_active_key() {
        let store = Arc::new(InMemoryBillingKeyStore::new());
        let user = UserId::new("u1").unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .register_key(new_key("u1", &format!("KEY-{}", i)), Timestamp::now())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let keys = store.keys_for(&user).await;
        assert_eq!(keys.len(), 16);
        assert_eq!(keys.iter().filter(|k| k.is_active()).count(), 1);
    }
}
