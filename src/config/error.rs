//! Configuration errors

use thiserror::Error;

/// Environment could not be read into an [`AppConfig`](super::AppConfig).
#[derive(Debug, Error)]
#[error("could not read configuration from the environment: {0}")]
pub struct ConfigError(#[from] config::ConfigError);

/// A setting was read but is unusable. Raised before the server binds.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must be set")]
    MissingRequired(&'static str),

    #[error("server port must be non-zero")]
    InvalidPort,

    #[error("cannot bind to {0}")]
    InvalidBindAddress(String),

    #[error("admin token is shorter than {0} characters")]
    WeakAdminToken(usize),

    #[error("request timeout must be 1..=300 seconds")]
    InvalidTimeout,

    #[error("database URL must use the postgres:// or postgresql:// scheme")]
    InvalidDatabaseUrl,

    #[error("database pool needs max_connections >= 1 and >= min_connections")]
    InvalidPoolSize,

    #[error("database pool is capped at 100 connections")]
    PoolSizeTooLarge,

    #[error("{0} must be an https URL")]
    GatewayUrlMustBeHttps(&'static str),

    #[error("{0} is not an absolute URL")]
    InvalidRedirectUrl(&'static str),

    #[error("the mock gateway cannot run in production")]
    MockGatewayInProduction,

    #[error("scheduler run hour must be 0..=23")]
    InvalidRunHour,

    #[error("failure threshold must be 1..=10")]
    InvalidFailureThreshold,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_setting() {
        let err = ValidationError::MissingRequired("RECURRING_BILLING__GATEWAY__API_KEY");
        assert_eq!(err.to_string(), "RECURRING_BILLING__GATEWAY__API_KEY must be set");
        assert_eq!(
            ValidationError::InvalidBindAddress("::1:80".into()).to_string(),
            "cannot bind to ::1:80"
        );
    }
}
