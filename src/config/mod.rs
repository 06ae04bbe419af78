//! Service configuration.
//!
//! Everything comes from `RECURRING_BILLING__<SECTION>__<KEY>` environment
//! variables (a `.env` file is honoured in development). Only the database
//! URL is mandatory; every other section has working defaults.
//!
//! # Example
//!
//! ```no_run
//! use recurring_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod gateway;
mod scheduler;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use gateway::{GatewayConfig, GatewayProtocol};
pub use scheduler::{Cadence, SchedulerConfig};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Reads `RECURRING_BILLING__GATEWAY__PROTOCOL=v2` as `gateway.protocol`,
    /// and so on. Fails only on missing or unparseable values; semantic
    /// checks live in [`AppConfig::validate`].
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("RECURRING_BILLING")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Missing gateway credentials surface here, before anything is billed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.gateway.validate(self.server.is_production())?;
        self.scheduler.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
