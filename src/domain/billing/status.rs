//! Subscription status state machine.
//!
//! ```text
//! active ──► suspended ──► active        (key re-registered)
//!   │            │
//!   │            ├──► cancelled
//!   │            └──► expired            (grace period elapsed)
//!   └──► cancelled ──► expired           (paid period over)
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Billed on schedule.
    Active,

    /// Billing halted until the user registers a working billing key.
    Suspended,

    /// User or admin cancelled. Never billed again.
    Cancelled,

    /// Access ended. Terminal.
    Expired,
}

impl SubscriptionStatus {
    /// Only active subscriptions are considered by the scheduler.
    pub fn is_billable(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn successors(&self) -> &'static [Self] {
        use SubscriptionStatus::*;
        match self {
            Active => &[Suspended, Cancelled],
            Suspended => &[Active, Cancelled, Expired],
            Cancelled => &[Expired],
            Expired => &[],
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "suspended" => Ok(SubscriptionStatus::Suspended),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown subscription status '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
