//! Gateway client port - signed exchanges with the external card gateway.
//!
//! One interface, several strategies (mock, protocol v1, protocol v2) chosen
//! by configuration. Implementations must:
//!
//! - refuse to charge a one-time token with `NotRecurringCapable` before any
//!   network I/O
//! - reject responses whose signature is missing or wrong with `Protocol`
//! - normalize network failures, timeouts, non-2xx statuses, undecodable
//!   bodies and declines into `Gateway(GatewayError)`

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::billing::{BillingError, BillingToken, CardMeta, OrderReference};
use crate::domain::foundation::Timestamp;

/// Result codes the gateway uses for success, depending on the endpoint.
pub const SUCCESS_CODES: [&str; 2] = ["0000", "00"];

pub fn is_success_code(code: &str) -> bool {
    SUCCESS_CODES.contains(&code.trim())
}

/// Buyer details printed on the gateway's receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buyer {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A recurring charge against a stored token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    pub order_ref: OrderReference,
    pub amount: i64,
    pub token: BillingToken,
    pub goods_name: String,
    pub buyer: Buyer,
    pub requested_at: Timestamp,
}

/// Gateway confirmation of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub result_code: String,
    pub result_message: String,
    pub raw_body: String,
}

/// Exchange of a short-lived auth token for a billing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIssuanceRequest {
    pub order_ref: OrderReference,
    pub auth_token: String,
    pub auth_url: Option<String>,
    pub idc_name: Option<String>,
    pub requested_at: Timestamp,
}

/// A billing key issued by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedKey {
    pub token: BillingToken,
    pub card: CardMeta,
    pub transaction_id: Option<String>,
    pub raw_body: String,
}

/// Signed fields the browser posts to the gateway's payment window to start
/// a zero-amount key issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceForm {
    pub mid: String,
    pub oid: String,
    pub price: i64,
    pub timestamp: String,
    pub signature: String,
    pub verification: String,
    pub m_key: String,
}

/// Result of an order inquiry, used to resolve stuck `pending` attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Paid { transaction_id: String },
    NotPaid { code: String, message: String },
    Unknown,
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Signs the payment-window form for a key issuance.
    fn prepare_issuance(
        &self,
        order_ref: &OrderReference,
        requested_at: Timestamp,
    ) -> Result<IssuanceForm, BillingError>;

    /// Exchanges an auth token for a billing key.
    async fn issue_key(&self, request: KeyIssuanceRequest) -> Result<IssuedKey, BillingError>;

    /// Charges a stored recurring-capable token.
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, BillingError>;

    /// Looks up what the gateway knows about an order reference.
    async fn query_order(
        &self,
        order_ref: &OrderReference,
        requested_at: Timestamp,
    ) -> Result<OrderStatus, BillingError>;
}
