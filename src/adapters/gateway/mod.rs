//! Card gateway adapters.
//!
//! One `GatewayClient` port, three strategies selected by
//! `gateway.protocol`:
//! - `mock` - approves everything, scriptable in tests
//! - `v1` - SHA-256, epoch millis, form-encoded
//! - `v2` - SHA-512, `yyyyMMddHHmmss`, JSON

mod mock;
mod protocol_v1;
mod protocol_v2;
mod reply;
mod signing;

use std::sync::Arc;

pub use mock::{GatewayCall, MockGatewayClient, MockOutcome};
pub use protocol_v1::{expected_auth_url, V1GatewayClient};
pub use protocol_v2::V2GatewayClient;

use crate::config::{GatewayConfig, GatewayProtocol};
use crate::domain::billing::BillingError;
use crate::ports::GatewayClient;

/// Builds the client strategy named by the configuration.
pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<dyn GatewayClient>, BillingError> {
    let client: Arc<dyn GatewayClient> = match config.protocol {
        GatewayProtocol::Mock => Arc::new(MockGatewayClient::new()),
        GatewayProtocol::V1 => Arc::new(V1GatewayClient::new(config)?),
        GatewayProtocol::V2 => Arc::new(V2GatewayClient::new(config)?),
    };
    tracing::info!(protocol = client.name(), "Gateway client ready");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn builds_mock_by_default() {
        let client = build_gateway(&GatewayConfig::default()).unwrap();
        assert_eq!(client.name(), "mock");
    }

    #[test]
    fn builds_configured_protocol() {
        let config = GatewayConfig {
            protocol: GatewayProtocol::V2,
            merchant_id: "INIBillTst".into(),
            api_key: Some(SecretString::new("key".into())),
            ..GatewayConfig::default()
        };
        assert_eq!(build_gateway(&config).unwrap().name(), "v2");
    }

    #[test]
    fn missing_secret_is_configuration_error() {
        let config = GatewayConfig {
            protocol: GatewayProtocol::V1,
            ..GatewayConfig::default()
        };
        assert!(matches!(
            build_gateway(&config),
            Err(BillingError::Configuration(_))
        ));
    }
}
