//! HTTP server settings

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::error::ValidationError;

const MIN_ADMIN_TOKEN_LEN: usize = 16;

/// Where the billing API listens and how it behaves.
///
/// Every field is optional in the environment; missing values fall back to
/// [`ServerConfig::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Upper bound on any single HTTP request, gateway round trips included
    pub request_timeout_secs: u64,
    /// Shared secret for `/admin` routes, which stay closed while unset
    pub admin_token: Option<SecretString>,
}

/// Deployment environment. Production switches logs to JSON and forbids the
/// mock gateway.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ValidationError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ValidationError::InvalidBindAddress(addr))
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if !(1..=300).contains(&self.request_timeout_secs) {
            return Err(ValidationError::InvalidTimeout);
        }
        self.socket_addr()?;

        let weak_token = self
            .admin_token
            .as_ref()
            .is_some_and(|t| t.expose_secret().trim().len() < MIN_ADMIN_TOKEN_LEN);
        if weak_token {
            return Err(ValidationError::WeakAdminToken(MIN_ADMIN_TOKEN_LEN));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Development,
            log_level: "info,recurring_billing=debug,sqlx=warn".to_string(),
            // Must exceed the gateway's 30s budget so the return handler can finish.
            request_timeout_secs: 45,
            admin_token: None,
        }
    }
}
