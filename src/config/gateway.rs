//! Card gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Which gateway client strategy to run.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayProtocol {
    /// Always approves. For environments without gateway credentials.
    #[default]
    Mock,
    /// Standard payment window protocol: SHA-256, form-encoded, epoch millis.
    V1,
    /// Direct API protocol: SHA-512, JSON, `yyyyMMddHHmmss` timestamps.
    V2,
}

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub protocol: GatewayProtocol,

    /// Merchant id (MID) assigned by the gateway
    #[serde(default)]
    pub merchant_id: String,

    /// Signing key for protocol v1
    pub sign_key: Option<SecretString>,

    /// API key for protocol v2
    pub api_key: Option<SecretString>,

    /// Base URL of the v1 API (charge and inquiry)
    #[serde(default = "default_v1_base_url")]
    pub v1_base_url: String,

    /// Base URL of the v2 API
    #[serde(default = "default_v2_base_url")]
    pub v2_base_url: String,

    /// Per-request budget in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Public URL of this service's key issuance return endpoint
    #[serde(default = "default_return_url")]
    pub return_url: String,

    /// Where the browser lands after a successful key registration
    #[serde(default = "default_success_redirect")]
    pub success_redirect_url: String,

    /// Where the browser lands after a failed key registration
    #[serde(default = "default_failure_redirect")]
    pub failure_redirect_url: String,

    /// Address reported to the gateway as the request origin
    #[serde(default = "default_client_ip")]
    pub client_ip: String,

    /// Fallback buyer email when the user system supplies none
    #[serde(default = "default_buyer_email")]
    pub default_buyer_email: String,

    /// Fallback buyer phone when the user system supplies none
    #[serde(default = "default_buyer_phone")]
    pub default_buyer_phone: String,

    /// Prefix of the goods name shown on statements
    #[serde(default = "default_goods_name_prefix")]
    pub goods_name_prefix: String,
}

impl GatewayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate gateway configuration
    ///
    /// Real protocols need a merchant id and the protocol's secret.
    pub fn validate(&self, production: bool) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 || self.timeout_secs > 120 {
            return Err(ValidationError::InvalidTimeout);
        }
        if !is_http_url(&self.return_url) {
            return Err(ValidationError::InvalidRedirectUrl("return_url"));
        }
        if !is_http_url(&self.success_redirect_url) {
            return Err(ValidationError::InvalidRedirectUrl("success_redirect_url"));
        }
        if !is_http_url(&self.failure_redirect_url) {
            return Err(ValidationError::InvalidRedirectUrl("failure_redirect_url"));
        }

        match self.protocol {
            GatewayProtocol::Mock => {
                if production {
                    return Err(ValidationError::MockGatewayInProduction);
                }
            }
            GatewayProtocol::V1 => {
                self.require_merchant_id()?;
                if !has_secret(&self.sign_key) {
                    return Err(ValidationError::MissingRequired("RECURRING_BILLING__GATEWAY__SIGN_KEY"));
                }
                if !self.v1_base_url.starts_with("https://") {
                    return Err(ValidationError::GatewayUrlMustBeHttps("v1_base_url"));
                }
            }
            GatewayProtocol::V2 => {
                self.require_merchant_id()?;
                if !has_secret(&self.api_key) {
                    return Err(ValidationError::MissingRequired("RECURRING_BILLING__GATEWAY__API_KEY"));
                }
                if !self.v2_base_url.starts_with("https://") {
                    return Err(ValidationError::GatewayUrlMustBeHttps("v2_base_url"));
                }
            }
        }
        Ok(())
    }

    fn require_merchant_id(&self) -> Result<(), ValidationError> {
        if self.merchant_id.trim().is_empty() {
            return Err(ValidationError::MissingRequired("RECURRING_BILLING__GATEWAY__MERCHANT_ID"));
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            protocol: GatewayProtocol::default(),
            merchant_id: String::new(),
            sign_key: None,
            api_key: None,
            v1_base_url: default_v1_base_url(),
            v2_base_url: default_v2_base_url(),
            timeout_secs: default_timeout(),
            return_url: default_return_url(),
            success_redirect_url: default_success_redirect(),
            failure_redirect_url: default_failure_redirect(),
            client_ip: default_client_ip(),
            default_buyer_email: default_buyer_email(),
            default_buyer_phone: default_buyer_phone(),
            goods_name_prefix: default_goods_name_prefix(),
        }
    }
}

fn has_secret(secret: &Option<SecretString>) -> bool {
    secret
        .as_ref()
        .map_or(false, |s| !s.expose_secret().trim().is_empty())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

fn default_v1_base_url() -> String {
    "https://stgstdpay.inicis.com/api/v1".to_string()
}

fn default_v2_base_url() -> String {
    "https://iniapi.inicis.com/v2/pg".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_return_url() -> String {
    "http://localhost:8080/billing/return".to_string()
}

fn default_success_redirect() -> String {
    "http://localhost:3000/service/payment/success".to_string()
}

fn default_failure_redirect() -> String {
    "http://localhost:3000/service/payment/fail".to_string()
}

fn default_client_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_buyer_email() -> String {
    "billing@example.com".to_string()
}

fn default_buyer_phone() -> String {
    "01000000000".to_string()
}

fn default_goods_name_prefix() -> String {
    "Membership".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_use_mock_with_thirty_second_budget() {
        let config = GatewayConfig::default();
        assert_eq!(config.protocol, GatewayProtocol::Mock);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_mock_rejected_in_production() {
        let config = GatewayConfig::default();
        assert_eq!(
            config.validate(true),
            Err(ValidationError::MockGatewayInProduction)
        );
    }

    #[test]
    fn test_v1_requires_sign_key() {
        let config = GatewayConfig {
            protocol: GatewayProtocol::V1,
            merchant_id: "INIBillTst".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::MissingRequired("RECURRING_BILLING__GATEWAY__SIGN_KEY"))
        );
    }

    #[test]
    fn test_v2_requires_merchant_id() {
        let config = GatewayConfig {
            protocol: GatewayProtocol::V2,
            api_key: Some(SecretString::new("rKnPljRn5m6J9Mzz".to_string())),
            ..Default::default()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::MissingRequired("RECURRING_BILLING__GATEWAY__MERCHANT_ID"))
        );
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let config = GatewayConfig {
            protocol: GatewayProtocol::V2,
            merchant_id: "INIBillTst".to_string(),
            api_key: Some(SecretString::new("   ".to_string())),
            ..Default::default()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_v2_with_credentials_is_valid() {
        let config = GatewayConfig {
            protocol: GatewayProtocol::V2,
            merchant_id: "INIBillTst".to_string(),
            api_key: Some(SecretString::new("rKnPljRn5m6J9Mzz".to_string())),
            ..Default::default()
        };
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_rejects_non_http_redirect() {
        let config = GatewayConfig {
            success_redirect_url: "javascript:alert(1)".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(false),
            Err(ValidationError::InvalidRedirectUrl("success_redirect_url"))
        );
    }
}
