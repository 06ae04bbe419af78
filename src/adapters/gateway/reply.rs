//! Decoded gateway reply bodies.
//!
//! The gateway answers with JSON, sometimes flat and sometimes with the
//! payload nested under `data`. Field lookups check both places and render
//! numbers as strings so digests can be recomputed from echoed values.

use serde_json::Value;

use crate::domain::billing::{BillingError, GatewayError, OrderReference};

use super::signing::{signatures_match, transport_error};

#[derive(Debug, Clone)]
pub struct GatewayReply {
    body: Value,
    raw: String,
}

impl GatewayReply {
    /// Decodes a raw body. Anything that is not a JSON object is malformed.
    pub fn parse(raw: impl Into<String>) -> Result<Self, BillingError> {
        let raw = raw.into();
        match serde_json::from_str::<Value>(&raw) {
            Ok(body @ Value::Object(_)) => Ok(Self { body, raw }),
            Ok(_) => Err(GatewayError::malformed("reply is not a JSON object", raw).into()),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode gateway reply");
                Err(GatewayError::malformed(format!("invalid JSON: {}", e), raw).into())
            }
        }
    }

    /// Reads the body of an HTTP response, rejecting non-2xx statuses.
    pub async fn read(response: reqwest::Response) -> Result<Self, BillingError> {
        let status = response.status();
        let raw = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Gateway returned non-success status");
            return Err(GatewayError::http_status(status.as_u16(), raw).into());
        }
        Self::parse(raw)
    }

    /// Looks a field up at the top level, then under `data`.
    pub fn field(&self, name: &str) -> Option<String> {
        self.body
            .get(name)
            .or_else(|| self.body.get("data").and_then(|data| data.get(name)))
            .and_then(render)
    }

    /// First present field among several aliases.
    pub fn first_of(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.field(name))
    }

    pub fn result_code(&self) -> Result<String, BillingError> {
        self.field("resultCode").ok_or_else(|| {
            GatewayError::malformed("reply carries no resultCode", self.raw.clone()).into()
        })
    }

    pub fn result_message(&self) -> String {
        self.first_of(&["resultMsg", "resultMessage"])
            .unwrap_or_default()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Extracts the fields a reply signature covers and checks that they
    /// echo the request.
    pub fn echoed(
        &self,
        order_ref: &OrderReference,
        expected_price: Option<i64>,
    ) -> Result<Echo, BillingError> {
        let moid = self
            .first_of(&["moid", "oid", "MOID"])
            .ok_or_else(|| BillingError::protocol("reply does not echo the order reference"))?;
        if moid != order_ref.to_string() {
            tracing::warn!(
                order_ref = %order_ref,
                echoed = %moid,
                "Gateway reply echoes a different order reference"
            );
            return Err(BillingError::protocol("order reference mismatch"));
        }

        let price = self
            .field("price")
            .ok_or_else(|| BillingError::protocol("reply does not echo the price"))?;
        if let Some(expected) = expected_price {
            if price.trim().parse::<i64>().ok() != Some(expected) {
                return Err(BillingError::protocol(format!(
                    "price mismatch: expected {}, got {}",
                    expected, price
                )));
            }
        }

        let timestamp = self
            .field("timestamp")
            .ok_or_else(|| BillingError::protocol("reply carries no timestamp"))?;

        Ok(Echo {
            moid,
            price,
            timestamp,
        })
    }

    /// Fails closed unless `field` holds the expected digest.
    pub fn verify_signature(&self, field: &str, expected_hex: &str) -> Result<(), BillingError> {
        let provided = self
            .field(field)
            .ok_or_else(|| BillingError::protocol("reply is not signed"))?;
        if signatures_match(expected_hex, &provided) {
            Ok(())
        } else {
            tracing::warn!(field, "Gateway reply signature mismatch");
            Err(BillingError::protocol("reply signature mismatch"))
        }
    }
}

/// Reply fields covered by the gateway's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    pub moid: String,
    pub price: String,
    pub timestamp: String,
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::GatewayErrorKind;

    fn kind_of(err: BillingError) -> GatewayErrorKind {
        match err {
            BillingError::Gateway(e) => e.kind,
            other => panic!("expected gateway error, got {:?}", other),
        }
    }

    #[test]
    fn reads_top_level_and_nested_fields() {
        let reply = GatewayReply::parse(
            r#"{"resultCode":"00","resultMsg":"ok","data":{"tid":"T1","price":9900}}"#,
        )
        .unwrap();
        assert_eq!(reply.result_code().unwrap(), "00");
        assert_eq!(reply.result_message(), "ok");
        assert_eq!(reply.field("tid").as_deref(), Some("T1"));
        assert_eq!(reply.field("price").as_deref(), Some("9900"));
    }

    #[test]
    fn top_level_field_wins_over_nested() {
        let reply = GatewayReply::parse(r#"{"tid":"outer","data":{"tid":"inner"}}"#).unwrap();
        assert_eq!(reply.field("tid").as_deref(), Some("outer"));
    }

    #[test]
    fn first_of_skips_missing_and_empty() {
        let reply = GatewayReply::parse(r#"{"billKey":"","tid":"T9"}"#).unwrap();
        assert_eq!(reply.first_of(&["billKey", "tid"]).as_deref(), Some("T9"));
    }

    #[test]
    fn html_body_is_malformed() {
        let err = GatewayReply::parse("<html><title>error</title></html>").unwrap_err();
        assert_eq!(kind_of(err), GatewayErrorKind::MalformedResponse);
    }

    #[test]
    fn json_array_is_malformed() {
        let err = GatewayReply::parse("[1,2]").unwrap_err();
        assert_eq!(kind_of(err), GatewayErrorKind::MalformedResponse);
    }

    fn order_ref() -> OrderReference {
        "charge_1700000000000_sub-1".parse().unwrap()
    }

    #[test]
    fn echoed_fields_are_checked_against_request() {
        let reply = GatewayReply::parse(
            r#"{"moid":"charge_1700000000000_sub-1","price":"9900","timestamp":"1700000000001"}"#,
        )
        .unwrap();
        let echo = reply.echoed(&order_ref(), Some(9900)).unwrap();
        assert_eq!(echo.price, "9900");
        assert_eq!(echo.timestamp, "1700000000001");
    }

    #[test]
    fn foreign_order_reference_is_protocol_error() {
        let reply = GatewayReply::parse(
            r#"{"moid":"charge_1700000000000_other","price":"9900","timestamp":"1"}"#,
        )
        .unwrap();
        assert!(matches!(
            reply.echoed(&order_ref(), Some(9900)),
            Err(BillingError::Protocol(_))
        ));
    }

    #[test]
    fn price_mismatch_is_protocol_error() {
        let reply = GatewayReply::parse(
            r#"{"moid":"charge_1700000000000_sub-1","price":"100","timestamp":"1"}"#,
        )
        .unwrap();
        assert!(matches!(
            reply.echoed(&order_ref(), Some(9900)),
            Err(BillingError::Protocol(_))
        ));
    }

    #[test]
    fn unsigned_reply_fails_closed() {
        let reply = GatewayReply::parse(r#"{"resultCode":"00"}"#).unwrap();
        assert!(matches!(
            reply.verify_signature("signature", "abcd"),
            Err(BillingError::Protocol(_))
        ));
    }

    #[test]
    fn missing_result_code_is_malformed() {
        let reply = GatewayReply::parse(r#"{"resultMsg":"?"}"#).unwrap();
        assert_eq!(kind_of(reply.result_code().unwrap_err()), GatewayErrorKind::MalformedResponse);
    }
}
