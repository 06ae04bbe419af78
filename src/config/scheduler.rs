//! Billing scheduler configuration

use serde::Deserialize;
use std::time::Duration;

use crate::domain::billing::{BillingPeriod, RetryPolicy};

use super::error::ValidationError;

/// How often the scheduler fires and how long a billing cycle is.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    /// Daily tick at `daily_run_hour_utc`, monthly billing period.
    #[default]
    Production,
    /// Tick every minute, one-minute billing period and backoff.
    Accelerated,
}

/// Scheduler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Start the periodic loop. The admin trigger works either way.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub cadence: Cadence,

    /// Hour of day (UTC) of the production tick
    #[serde(default = "default_run_hour")]
    pub daily_run_hour_utc: u32,

    /// Consecutive failed charges before a subscription is suspended
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,

    /// Delay before retrying a failed charge. Defaults to one day, or one
    /// minute on the accelerated cadence.
    pub retry_backoff_secs: Option<u64>,

    /// Days a suspended subscription is kept before it expires
    #[serde(default = "default_suspended_grace_days")]
    pub suspended_grace_days: u32,

    /// Age after which a `pending` ledger row is reconciled
    #[serde(default = "default_reconcile_after")]
    pub reconcile_after_secs: u64,

    /// Pause between consecutive charges within one tick
    #[serde(default = "default_charge_spacing")]
    pub charge_spacing_ms: u64,
}

impl SchedulerConfig {
    pub fn billing_period(&self) -> BillingPeriod {
        match self.cadence {
            Cadence::Production => BillingPeriod::Monthly,
            Cadence::Accelerated => BillingPeriod::Minutes(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff_secs = self.retry_backoff_secs.unwrap_or(match self.cadence {
            Cadence::Production => 86_400,
            Cadence::Accelerated => 60,
        });
        RetryPolicy::new(
            self.max_consecutive_failures,
            chrono::Duration::seconds(backoff_secs as i64),
        )
    }

    pub fn suspended_grace(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.suspended_grace_days))
    }

    pub fn reconcile_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reconcile_after_secs as i64)
    }

    pub fn charge_spacing(&self) -> Duration {
        Duration::from_millis(self.charge_spacing_ms)
    }

    /// Validate scheduler configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.daily_run_hour_utc > 23 {
            return Err(ValidationError::InvalidRunHour);
        }
        if !(1..=10).contains(&self.max_consecutive_failures) {
            return Err(ValidationError::InvalidFailureThreshold);
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            cadence: Cadence::default(),
            daily_run_hour_utc: default_run_hour(),
            max_consecutive_failures: default_max_failures(),
            retry_backoff_secs: None,
            suspended_grace_days: default_suspended_grace_days(),
            reconcile_after_secs: default_reconcile_after(),
            charge_spacing_ms: default_charge_spacing(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_run_hour() -> u32 {
    2
}

fn default_max_failures() -> u32 {
    3
}

fn default_suspended_grace_days() -> u32 {
    7
}

fn default_reconcile_after() -> u64 {
    900
}

fn default_charge_spacing() -> u64 {
    1000
}
