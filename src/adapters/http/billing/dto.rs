//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API
//! and the parameters of the gateway's key issuance return.

use serde::{Deserialize, Serialize};

use crate::application::handlers::billing::CompleteKeyIssuanceCommand;
use crate::domain::billing::{PlanTier, Subscription, SubscriptionStatus};
use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a paid subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSubscriptionRequest {
    pub plan: PlanTier,
    /// Overrides the plan's list price, in minor units.
    #[serde(default)]
    pub price: Option<i64>,
}

/// Parameters the gateway sends back after the payment window closes.
///
/// Arrives as a query string or a form body depending on the protocol.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssuanceReturnParams {
    #[serde(rename = "resultCode", default)]
    pub result_code: String,
    #[serde(rename = "resultMsg", alias = "resultMessage", default)]
    pub result_message: String,
    #[serde(rename = "orderNumber", alias = "oid", alias = "moid", default)]
    pub order_ref: String,
    #[serde(rename = "authToken", default)]
    pub auth_token: Option<String>,
    #[serde(rename = "authUrl", default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub idc_name: Option<String>,
}

impl From<IssuanceReturnParams> for CompleteKeyIssuanceCommand {
    fn from(params: IssuanceReturnParams) -> Self {
        Self {
            result_code: params.result_code,
            result_message: params.result_message,
            order_ref: params.order_ref,
            auth_token: params.auth_token,
            auth_url: params.auth_url,
            idc_name: params.idc_name,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Subscription as shown to its owner.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan: PlanTier,
    pub price: i64,
    pub status: SubscriptionStatus,
    pub next_billing_at: Option<Timestamp>,
    pub retry_at: Option<Timestamp>,
    pub consecutive_failures: u32,
    pub cancelled_at: Option<Timestamp>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            user_id: sub.user_id,
            plan: sub.plan,
            price: sub.price,
            status: sub.status,
            next_billing_at: sub.next_billing_at,
            retry_at: sub.retry_at,
            consecutive_failures: sub.consecutive_failures,
            cancelled_at: sub.cancelled_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveKeyResponse {
    pub removed: bool,
}

/// Error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
