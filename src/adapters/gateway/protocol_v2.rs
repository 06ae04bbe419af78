//! Protocol v2 gateway client (direct API family).
//!
//! SHA-512 digests, `yyyyMMddHHmmss` timestamps in Korean standard time and
//! JSON bodies of the shape `{mid, type, paymethod, timestamp, clientIp, data,
//! hashData}`.
//!
//! Request digest: `sha512(apiKey + mid + type + timestamp + json(data))` with
//! backslashes stripped from the plain text. Reply digest:
//! `sha512(apiKey + mid + moid + price + timestamp)`.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::config::GatewayConfig;
use crate::domain::billing::{BillingError, BillingToken, CardMeta, GatewayError, OrderReference};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    ChargeReceipt, ChargeRequest, GatewayClient, IssuanceForm, IssuedKey, KeyIssuanceRequest,
    OrderStatus,
};

use super::reply::GatewayReply;
use super::signing::{
    classify_decline, ensure_recurring_capable, is_success_code, kst_timestamp, sha512_hex,
    transport_error,
};

const TYPE_BILLING: &str = "billing";
const TYPE_ISSUANCE: &str = "pay";
const TYPE_INQUIRY: &str = "inquiry";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BillingData<'a> {
    url: &'a str,
    moid: String,
    good_name: &'a str,
    buyer_name: String,
    buyer_email: String,
    buyer_tel: String,
    price: String,
    bill_key: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IssuanceData<'a> {
    url: &'a str,
    moid: String,
    auth_token: &'a str,
    price: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InquiryData {
    moid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a, D: Serialize> {
    mid: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    paymethod: &'static str,
    timestamp: String,
    client_ip: &'a str,
    data: &'a D,
    hash_data: String,
}

/// Protocol v2 client.
pub struct V2GatewayClient {
    merchant_id: String,
    api_key: SecretString,
    base_url: String,
    site_url: String,
    client_ip: String,
    default_buyer_email: String,
    default_buyer_phone: String,
    http_client: reqwest::Client,
}

impl V2GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, BillingError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| BillingError::Configuration("protocol v2 requires an API key".into()))?;
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BillingError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            merchant_id: config.merchant_id.clone(),
            api_key,
            base_url: config.v2_base_url.trim_end_matches('/').to_string(),
            site_url: config.success_redirect_url.clone(),
            client_ip: config.client_ip.clone(),
            default_buyer_email: config.default_buyer_email.clone(),
            default_buyer_phone: config.default_buyer_phone.clone(),
            http_client,
        })
    }

    fn key(&self) -> &str {
        self.api_key.expose_secret()
    }

    fn request_hash(&self, kind: &str, timestamp: &str, data_json: &str) -> String {
        let plain = format!(
            "{}{}{}{}{}",
            self.key(),
            self.merchant_id,
            kind,
            timestamp,
            data_json
        );
        sha512_hex(&plain.replace('\\', ""))
    }

    fn reply_hash(&self, moid: &str, price: &str, timestamp: &str) -> String {
        sha512_hex(&format!(
            "{}{}{}{}{}",
            self.key(),
            self.merchant_id,
            moid,
            price,
            timestamp
        ))
    }

    fn verify(
        &self,
        reply: &GatewayReply,
        order_ref: &OrderReference,
        expected_price: Option<i64>,
    ) -> Result<(), BillingError> {
        let echo = reply.echoed(order_ref, expected_price)?;
        let expected = self.reply_hash(&echo.moid, &echo.price, &echo.timestamp);
        reply.verify_signature("hashData", &expected)
    }

    async fn send<D: Serialize + Sync>(
        &self,
        kind: &'static str,
        requested_at: Timestamp,
        data: &D,
    ) -> Result<GatewayReply, BillingError> {
        let timestamp = kst_timestamp(requested_at);
        let data_json = serde_json::to_string(data)
            .map_err(|e| BillingError::protocol(format!("cannot encode request: {}", e)))?;
        let envelope = Envelope {
            mid: &self.merchant_id,
            kind,
            paymethod: "card",
            hash_data: self.request_hash(kind, &timestamp, &data_json),
            timestamp,
            client_ip: &self.client_ip,
            data,
        };

        let response = self
            .http_client
            .post(format!("{}/{}", self.base_url, kind))
            .json(&envelope)
            .send()
            .await
            .map_err(transport_error)?;
        GatewayReply::read(response).await
    }
}

#[async_trait]
impl GatewayClient for V2GatewayClient {
    fn name(&self) -> &'static str {
        "v2"
    }

    fn prepare_issuance(
        &self,
        order_ref: &OrderReference,
        requested_at: Timestamp,
    ) -> Result<IssuanceForm, BillingError> {
        let oid = order_ref.to_string();
        let timestamp = kst_timestamp(requested_at);
        Ok(IssuanceForm {
            mid: self.merchant_id.clone(),
            signature: sha512_hex(&format!("oid={}&price=0&timestamp={}", oid, timestamp)),
            verification: sha512_hex(&format!(
                "oid={}&price=0&signKey={}&timestamp={}",
                oid,
                self.key(),
                timestamp
            )),
            m_key: sha512_hex(self.key()),
            oid,
            price: 0,
            timestamp,
        })
    }

    async fn issue_key(&self, request: KeyIssuanceRequest) -> Result<IssuedKey, BillingError> {
        let data = IssuanceData {
            url: &self.site_url,
            moid: request.order_ref.to_string(),
            auth_token: &request.auth_token,
            price: "0",
        };

        tracing::info!(order_ref = %request.order_ref, "Requesting billing key");
        let reply = self.send(TYPE_ISSUANCE, request.requested_at, &data).await?;

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
            reply.first_of(&["cardNumber", "cardNum"]).as_deref(),
            reply.first_of(&["cardName", "cardCode"]).as_deref(),
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

        let buyer = &request.buyer;
        let data = BillingData {
            url: &self.site_url,
            moid: request.order_ref.to_string(),
            good_name: &request.goods_name,
            buyer_name: buyer.name.clone().unwrap_or_else(|| "Customer".into()),
            buyer_email: buyer
                .email
                .clone()
                .unwrap_or_else(|| self.default_buyer_email.clone()),
            buyer_tel: buyer
                .phone
                .clone()
                .unwrap_or_else(|| self.default_buyer_phone.clone()),
            price: request.amount.to_string(),
            bill_key: request.token.expose(),
        };

        tracing::info!(
            order_ref = %request.order_ref,
            amount = request.amount,
            token = %request.token.redacted(),
            "Sending v2 charge"
        );
        let reply = self.send(TYPE_BILLING, request.requested_at, &data).await?;

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
        let data = InquiryData {
            moid: order_ref.to_string(),
        };
        let reply = self.send(TYPE_INQUIRY, requested_at, &data).await?;

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayProtocol;
    use crate::domain::foundation::UserId;
    use crate::ports::Buyer;
    use chrono::{TimeZone, Utc};

    const API_KEY: &str = "ItEQKi3rY7uvDS8l";

    fn config() -> GatewayConfig {
        GatewayConfig {
            protocol: GatewayProtocol::V2,
            merchant_id: "INIBillTst".into(),
            api_key: Some(SecretString::new(API_KEY.into())),
            ..GatewayConfig::default()
        }
    }

    fn client() -> V2GatewayClient {
        V2GatewayClient::new(&config()).unwrap()
    }

    #[test]
    fn requires_api_key() {
        let config = GatewayConfig {
            api_key: None,
            ..config()
        };
        assert!(matches!(
            V2GatewayClient::new(&config),
            Err(BillingError::Configuration(_))
        ));
    }

    #[test]
    fn request_hash_strips_backslashes() {
        let client = client();
        let json = r#"{"goodName":"a\"b"}"#;
        assert_eq!(
            client.request_hash("billing", "20240101000000", json),
            sha512_hex(&format!(
                "{}INIBillTstbilling20240101000000{{\"goodName\":\"a\"b\"}}",
                API_KEY
            ))
        );
    }

    #[test]
    fn billing_data_serializes_in_field_order() {
        let data = BillingData {
            url: "http://localhost:3000",
            moid: "charge_1_s".into(),
            good_name: "Pro",
            buyer_name: "Kim".into(),
            buyer_email: "a@b.c".into(),
            buyer_tel: "01000000000".into(),
            price: "9900".into(),
            bill_key: "key",
        };
        assert_eq!(
            serde_json::to_string(&data).unwrap(),
            r#"{"url":"http://localhost:3000","moid":"charge_1_s","goodName":"Pro","buyerName":"Kim","buyerEmail":"a@b.c","buyerTel":"01000000000","price":"9900","billKey":"key"}"#
        );
    }

    #[test]
    fn issuance_form_uses_sha512_and_kst() {
        let user = UserId::new("7").unwrap();
        let at = Timestamp::from_datetime(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let order_ref = OrderReference::for_issuance(&user, at);
        let form = client().prepare_issuance(&order_ref, at).unwrap();

        assert_eq!(form.timestamp, "20240101090000");
        assert_eq!(form.signature.len(), 128);
        assert_eq!(form.m_key, sha512_hex(API_KEY));
    }

    #[test]
    fn reply_hash_verifies() {
        let client = client();
        let order_ref: OrderReference = "charge_1700000000000_sub".parse().unwrap();
        let hash = client.reply_hash("charge_1700000000000_sub", "9900", "20240101090000");
        let reply = GatewayReply::parse(format!(
            r#"{{"resultCode":"00","data":{{"moid":"charge_1700000000000_sub","price":9900,"timestamp":"20240101090000","tid":"T1"}},"hashData":"{}"}}"#,
            hash
        ))
        .unwrap();
        assert!(client.verify(&reply, &order_ref, Some(9900)).is_ok());
    }

    #[test]
    fn reply_with_wrong_hash_is_rejected() {
        let client = client();
        let order_ref: OrderReference = "charge_1700000000000_sub".parse().unwrap();
        let reply = GatewayReply::parse(format!(
            r#"{{"resultCode":"00","moid":"charge_1700000000000_sub","price":"9900","timestamp":"1","hashData":"{}"}}"#,
            sha512_hex("forged")
        ))
        .unwrap();
        assert!(matches!(
            client.verify(&reply, &order_ref, Some(9900)),
            Err(BillingError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn one_time_token_is_refused_before_network() {
        let config = GatewayConfig {
            v2_base_url: "https://127.0.0.1:1".into(),
            ..config()
        };
        let request = ChargeRequest {
            order_ref: "charge_1700000000000_sub".parse().unwrap(),
            amount: 9900,
            token: BillingToken::new("StdpayCARDxyz").unwrap(),
            goods_name: "Pro".into(),
            buyer: Buyer::default(),
            requested_at: Timestamp::now(),
        };
        let err = V2GatewayClient::new(&config)
            .unwrap()
            .charge(request)
            .await
            .unwrap_err();
        assert_eq!(err, BillingError::NotRecurringCapable);
    }
}
