//! Protocol v1 gateway client (standard payment window family).
//!
//! SHA-256 digests, epoch-millisecond timestamps and form-encoded requests.
//!
//! # Security
//!
//! - Key issuance only posts the auth token to the auth URL derived from the
//!   callback's IDC name. A callback naming any other URL is rejected.
//! - Successful replies must echo the order reference and amount and carry
//!   `signature = sha256(mid + moid + price + timestamp + signKey)`.
//!
//! # Configuration
//!
//! ```text
//! RECURRING_BILLING__GATEWAY__PROTOCOL=v1
//! RECURRING_BILLING__GATEWAY__MERCHANT_ID=INIBillTst
//! RECURRING_BILLING__GATEWAY__SIGN_KEY=...
//! ```

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::GatewayConfig;
use crate::domain::billing::{BillingError, BillingToken, CardMeta, GatewayError, OrderReference};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    ChargeReceipt, ChargeRequest, GatewayClient, IssuanceForm, IssuedKey, KeyIssuanceRequest,
    OrderStatus,
};

use super::reply::GatewayReply;
use super::signing::{
    classify_decline, ensure_recurring_capable, is_success_code, sha256_hex, transport_error,
};

/// IDC names the payment window may send back, each with its own auth host.
const KNOWN_IDCS: [&str; 3] = ["fc", "ks", "stg"];

/// The only auth URL accepted for a callback from `idc_name`.
pub fn expected_auth_url(idc_name: &str) -> Option<String> {
    KNOWN_IDCS
        .contains(&idc_name)
        .then(|| format!("https://{}stdpay.inicis.com/api/payAuth", idc_name))
}

/// Protocol v1 client.
pub struct V1GatewayClient {
    merchant_id: String,
    sign_key: SecretString,
    base_url: String,
    client_ip: String,
    default_buyer_email: String,
    default_buyer_phone: String,
    http_client: reqwest::Client,
}

impl V1GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, BillingError> {
        let sign_key = config
            .sign_key
            .clone()
            .ok_or_else(|| BillingError::Configuration("protocol v1 requires a sign key".into()))?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BillingError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            merchant_id: config.merchant_id.clone(),
            sign_key,
            base_url: config.v1_base_url.trim_end_matches('/').to_string(),
            client_ip: config.client_ip.clone(),
            default_buyer_email: config.default_buyer_email.clone(),
            default_buyer_phone: config.default_buyer_phone.clone(),
            http_client,
        })
    }

    fn key(&self) -> &str {
        self.sign_key.expose_secret()
    }

    fn charge_signature(&self, oid: &str, price: &str, timestamp: &str) -> String {
        sha256_hex(&format!(
            "{}{}{}{}{}",
            self.merchant_id,
            oid,
            price,
            timestamp,
            self.key()
        ))
    }

    /// Checks the echoed fields and signature of a successful reply.
    fn verify(
        &self,
        reply: &GatewayReply,
        order_ref: &OrderReference,
        expected_price: Option<i64>,
    ) -> Result<(), BillingError> {
        let echo = reply.echoed(order_ref, expected_price)?;
        let expected = self.charge_signature(&echo.moid, &echo.price, &echo.timestamp);
        reply.verify_signature("signature", &expected)
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<GatewayReply, BillingError> {
        let response = self
            .http_client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(transport_error)?;
        GatewayReply::read(response).await
    }
}

#[async_trait]
impl GatewayClient for V1GatewayClient {
    fn name(&self) -> &'static str {
        "v1"
    }

    fn prepare_issuance(
        &self,
        order_ref: &OrderReference,
        requested_at: Timestamp,
    ) -> Result<IssuanceForm, BillingError> {
        let oid = order_ref.to_string();
        let timestamp = requested_at.epoch_millis().to_string();
        let signature = sha256_hex(&format!("oid={}&price=0&timestamp={}", oid, timestamp));
        let verification = sha256_hex(&format!(
            "oid={}&price=0&signKey={}&timestamp={}",
            oid,
            self.key(),
            timestamp
        ));

        Ok(IssuanceForm {
            mid: self.merchant_id.clone(),
            oid,
            price: 0,
            timestamp,
            signature,
            verification,
            m_key: sha256_hex(self.key()),
        })
    }

    async fn issue_key(&self, request: KeyIssuanceRequest) -> Result<IssuedKey, BillingError> {
        let idc_name = request
            .idc_name
            .as_deref()
            .ok_or_else(|| BillingError::protocol("callback carries no idc_name"))?;
        let auth_url = request
            .auth_url
            .as_deref()
            .ok_or_else(|| BillingError::protocol("callback carries no authUrl"))?;
        let expected = expected_auth_url(idc_name)
            .ok_or_else(|| BillingError::protocol(format!("unknown IDC '{}'", idc_name)))?;
        if auth_url != expected {
            tracing::warn!(
                order_ref = %request.order_ref,
                idc_name,
                received = auth_url,
                "authUrl does not match IDC"
            );
            return Err(BillingError::protocol("authUrl does not match IDC"));
        }

        let timestamp = request.requested_at.epoch_millis().to_string();
        let signature = sha256_hex(&format!(
            "authToken={}&timestamp={}",
            request.auth_token, timestamp
        ));
        let verification = sha256_hex(&format!(
            "authToken={}&signKey={}&timestamp={}",
            request.auth_token,
            self.key(),
            timestamp
        ));
        let params = [
            ("mid", self.merchant_id.clone()),
            ("authToken", request.auth_token.clone()),
            ("timestamp", timestamp),
            ("signature", signature),
            ("verification", verification),
            ("charset", "UTF-8".to_string()),
            ("format", "JSON".to_string()),
        ];

        tracing::info!(order_ref = %request.order_ref, idc_name, "Requesting billing key");
        let reply = self.post_form(&expected, &params).await?;

        let code = reply.result_code()?;
        if !is_success_code(&code) {
            let message = reply.result_message();
            tracing::warn!(order_ref = %request.order_ref, code = %code, message = %message, "Key issuance declined");
            return Err(classify_decline(&code, &message, reply.raw()).into());
        }
        self.verify(&reply, &request.order_ref, Some(0))?;

        let token = reply
            .first_of(&["billKey", "tid"])
            .ok_or_else(|| GatewayError::malformed("reply carries no billing key", reply.raw()))?;
        let token = BillingToken::new(token)?;
        let card = CardMeta::new(
            reply.first_of(&["cardNumber", "CARD_Num", "cardNum"]).as_deref(),
            reply.first_of(&["cardName", "P_FN_NM", "CARD_BankCode"]).as_deref(),
        );

        tracing::info!(order_ref = %request.order_ref, token = %token.redacted(), "Billing key issued");
        Ok(IssuedKey {
            token,
            card,
            transaction_id: reply.field("tid"),
            raw_body: reply.raw().to_string(),
        })
    }

    async fn charge(&self, request: ChargeRequest) -> Result<ChargeReceipt, BillingError> {
        ensure_recurring_capable(&request.token)?;

        let oid = request.order_ref.to_string();
        let price = request.amount.to_string();
        let timestamp = request.requested_at.epoch_millis().to_string();
        let signature = self.charge_signature(&oid, &price, &timestamp);
        let buyer = &request.buyer;
        let params = [
            ("mid", self.merchant_id.clone()),
            ("oid", oid),
            ("price", price),
            ("timestamp", timestamp),
            ("signature", signature),
            ("billKey", request.token.expose().to_string()),
            ("goodName", request.goods_name.clone()),
            ("buyerName", buyer.name.clone().unwrap_or_else(|| "Customer".into())),
            (
                "buyerEmail",
                buyer.email.clone().unwrap_or_else(|| self.default_buyer_email.clone()),
            ),
            (
                "buyerTel",
                buyer.phone.clone().unwrap_or_else(|| self.default_buyer_phone.clone()),
            ),
            ("clientIp", self.client_ip.clone()),
        ];

        tracing::info!(
            order_ref = %request.order_ref,
            amount = request.amount,
            token = %request.token.redacted(),
            "Sending v1 charge"
        );
        let reply = self
            .post_form(&format!("{}/billing", self.base_url), &params)
            .await?;

        let code = reply.result_code()?;
        if !is_success_code(&code) {
            let message = reply.result_message();
            tracing::warn!(order_ref = %request.order_ref, code = %code, message = %message, "Charge declined");
            return Err(classify_decline(&code, &message, reply.raw()).into());
        }
        self.verify(&reply, &request.order_ref, Some(request.amount))?;

        let transaction_id = reply
            .field("tid")
            .ok_or_else(|| GatewayError::malformed("reply carries no tid", reply.raw()))?;
        Ok(ChargeReceipt {
            transaction_id,
            result_code: code,
            result_message: reply.result_message(),
            raw_body: reply.raw().to_string(),
        })
    }

    async fn query_order(
        &self,
        order_ref: &OrderReference,
        requested_at: Timestamp,
    ) -> Result<OrderStatus, BillingError> {
        let oid = order_ref.to_string();
        let timestamp = requested_at.epoch_millis().to_string();
        let signature = sha256_hex(&format!(
            "{}{}{}{}",
            self.merchant_id,
            oid,
            timestamp,
            self.key()
        ));
        let params = [
            ("mid", self.merchant_id.clone()),
            ("oid", oid),
            ("timestamp", timestamp),
            ("signature", signature),
        ];

        let reply = self
            .post_form(&format!("{}/inquiry", self.base_url), &params)
            .await?;
        let code = reply.result_code()?;
        if !is_success_code(&code) {
            return Ok(OrderStatus::NotPaid {
                code,
                message: reply.result_message(),
            });
        }
        self.verify(&reply, order_ref, None)?;

        match reply.field("tid") {
            Some(transaction_id) => Ok(OrderStatus::Paid { transaction_id }),
            None => Ok(OrderStatus::Unknown),
        }
    }
}
