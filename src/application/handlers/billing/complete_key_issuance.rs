//! CompleteKeyIssuanceHandler - handles the gateway's key issuance return.
//!
//! The gateway redirects the user back with a result code, a short-lived auth
//! token and the order reference minted by `PrepareKeyIssuanceHandler`. The
//! token is exchanged for a billing key, which is then stored as the user's
//! only active key. A suspended subscription resumes billing immediately.
//!
//! Issuance at the gateway and storage here are not one transaction. A key
//! the gateway issued but this service failed to store is reported as
//! `RegisteredNotSaved` so the user retries registration instead of treating
//! it as a card problem.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingEvent, BillingKey, ChargePurpose, NewBillingKey, OrderReference,
    SubscriptionStatus,
};
use crate::domain::foundation::{SubscriptionId, UserId};
use crate::ports::{
    is_success_code, BillingKeyStore, Clock, GatewayClient, KeyIssuanceRequest, Notifier,
    SubscriptionStore,
};

/// Parameters of the gateway's return call.
#[derive(Debug, Clone, Default)]
pub struct CompleteKeyIssuanceCommand {
    pub result_code: String,
    pub result_message: String,
    pub order_ref: String,
    pub auth_token: Option<String>,
    pub auth_url: Option<String>,
    pub idc_name: Option<String>,
}

/// Result of a completed key issuance.
#[derive(Debug, Clone)]
pub struct CompleteKeyIssuanceResult {
    pub key: BillingKey,
    /// Subscription that was suspended and is billable again.
    pub reactivated: Option<SubscriptionId>,
}

pub struct CompleteKeyIssuanceHandler {
    gateway: Arc<dyn GatewayClient>,
    keys: Arc<dyn BillingKeyStore>,
    subscriptions: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl CompleteKeyIssuanceHandler {
    pub fn new(
        gateway: Arc<dyn GatewayClient>,
        keys: Arc<dyn BillingKeyStore>,
        subscriptions: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            gateway,
            keys,
            subscriptions,
            notifier,
            clock,
        }
    }

    pub async fn handle(
        &self,
        cmd: CompleteKeyIssuanceCommand,
    ) -> Result<CompleteKeyIssuanceResult, BillingError> {
        // 1. Validate the callback
        let order_ref: OrderReference = cmd.order_ref.trim().parse()?;
        if order_ref.purpose() != ChargePurpose::KeyIssuance {
            return Err(BillingError::protocol(format!(
                "{} is not a key issuance reference",
                order_ref
            )));
        }
        let user_id = order_ref
            .issuing_user()
            .ok_or_else(|| BillingError::protocol("issuance reference carries no user"))?;

        if !is_success_code(&cmd.result_code) {
            tracing::info!(
                user_id = %user_id,
                result_code = %cmd.result_code,
                "Key issuance declined at the payment window"
            );
            return Err(BillingError::Declined {
                code: cmd.result_code,
                message: cmd.result_message,
            });
        }
        let auth_token = cmd
            .auth_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BillingError::protocol("issuance callback without auth token"))?;

        // 2. Exchange the auth token for a billing key
        let issued = self
            .gateway
            .issue_key(KeyIssuanceRequest {
                order_ref: order_ref.clone(),
                auth_token,
                auth_url: cmd.auth_url,
                idc_name: cmd.idc_name,
                requested_at: self.clock.now(),
            })
            .await?;

        // 3. Store it as the only active key
        let new_key = NewBillingKey {
            user_id: user_id.clone(),
            token: issued.token.clone(),
            card: issued.card,
        };
        let key = match self.keys.register_key(new_key, self.clock.now()).await {
            Ok(key) => key,
            // Only a replay of this user's current key counts as registered.
            Err(BillingError::Conflict(reason)) => {
                let existing = self
                    .keys
                    .get_active_key(&user_id)
                    .await?
                    .filter(|key| key.token == issued.token);
                match existing {
                    Some(key) => {
                        tracing::info!(user_id = %user_id, "Billing key already registered");
                        key
                    }
                    None => {
                        tracing::warn!(
                            user_id = %user_id,
                            token = %issued.token.redacted(),
                            "Issued token is stored but not as this user's active key"
                        );
                        return Err(BillingError::Conflict(reason));
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    order_ref = %order_ref,
                    error = %e,
                    "Billing key issued by gateway but not saved"
                );
                self.publish(BillingEvent::RegisteredNotSaved {
                    user_id: user_id.clone(),
                    order_ref,
                })
                .await;
                return Err(BillingError::RegisteredNotSaved {
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!(
            user_id = %user_id,
            token = %key.token.redacted(),
            card = key.card.masked_number.as_deref().unwrap_or("-"),
            "Billing key registered"
        );

        // 4. Resume billing for a suspended subscription
        let reactivated = self.reactivate(&user_id).await;

        self.publish(BillingEvent::KeyRegistered {
            user_id,
            masked_card_number: key.card.masked_number.clone(),
        })
        .await;

        Ok(CompleteKeyIssuanceResult { key, reactivated })
    }

    /// The key is already stored at this point, so a failure here is logged
    /// rather than reported as a failed registration.
    async fn reactivate(&self, user_id: &UserId) -> Option<SubscriptionId> {
        let subscription = match self.subscriptions.find_live_by_user(user_id).await {
            Ok(Some(sub)) if sub.status == SubscriptionStatus::Suspended => sub,
            Ok(_) => return None,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Failed to load subscription");
                return None;
            }
        };

        match self
            .subscriptions
            .reactivate(subscription.id, self.clock.now())
            .await
        {
            Ok(true) => {
                tracing::info!(subscription_id = %subscription.id, "Subscription reactivated");
                Some(subscription.id)
            }
            Ok(false) => None,
            Err(e) => {
                tracing::error!(
                    subscription_id = %subscription.id,
                    error = %e,
                    "Failed to reactivate subscription"
                );
                None
            }
        }
    }

    async fn publish(&self, event: BillingEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            tracing::warn!(event_type = event.event_type(), error = %e, "Failed to deliver billing notification");
        }
    }
}
