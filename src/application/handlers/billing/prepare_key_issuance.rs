//! PrepareKeyIssuanceHandler - signs the payment-window form for a new card.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::{BillingError, OrderReference};
use crate::domain::foundation::UserId;
use crate::ports::{Clock, GatewayClient, IssuanceForm};

/// Command to start a key issuance.
#[derive(Debug, Clone)]
pub struct PrepareKeyIssuanceCommand {
    pub user_id: UserId,
}

/// Signed form fields plus where the gateway should send the user back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareKeyIssuanceResult {
    #[serde(flatten)]
    pub form: IssuanceForm,
    pub return_url: String,
}

pub struct PrepareKeyIssuanceHandler {
    gateway: Arc<dyn GatewayClient>,
    clock: Arc<dyn Clock>,
    return_url: String,
}

impl PrepareKeyIssuanceHandler {
    pub fn new(gateway: Arc<dyn GatewayClient>, clock: Arc<dyn Clock>, return_url: String) -> Self {
        Self {
            gateway,
            clock,
            return_url,
        }
    }

    pub async fn handle(
        &self,
        cmd: PrepareKeyIssuanceCommand,
    ) -> Result<PrepareKeyIssuanceResult, BillingError> {
        let now = self.clock.now();
        let order_ref = OrderReference::for_issuance(&cmd.user_id, now);
        let form = self.gateway.prepare_issuance(&order_ref, now)?;

        tracing::info!(user_id = %cmd.user_id, order_ref = %order_ref, "Key issuance prepared");
        Ok(PrepareKeyIssuanceResult {
            form,
            return_url: self.return_url.clone(),
        })
    }
}
