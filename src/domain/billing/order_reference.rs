//! Order references: the per-attempt identifier sent to the gateway and the
//! idempotency key of the payment ledger.
//!
//! Format: `{purpose}_{epochMillis}_{reference}` where `reference` is the
//! subscription id for charges and the user id for key issuance. For charges
//! `epochMillis` is the billing cycle's scheduled instant, not the wall clock,
//! so every scheduler tick computes the same reference for the same attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{SubscriptionId, Timestamp, UserId, ValidationError};

/// Why an order reference was minted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargePurpose {
    /// First charge attempt of a billing cycle.
    Charge,
    /// N-th retry of a billing cycle after consecutive failures.
    Retry(u32),
    /// Zero-amount authorization that yields a billing key.
    KeyIssuance,
}

impl fmt::Display for ChargePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargePurpose::Charge => write!(f, "charge"),
            ChargePurpose::Retry(n) => write!(f, "retry{}", n),
            ChargePurpose::KeyIssuance => write!(f, "billauth"),
        }
    }
}

impl FromStr for ChargePurpose {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "charge" => Ok(ChargePurpose::Charge),
            "billauth" => Ok(ChargePurpose::KeyIssuance),
            _ => s
                .strip_prefix("retry")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(ChargePurpose::Retry)
                .ok_or_else(|| {
                    ValidationError::invalid_format("order_ref", format!("unknown purpose '{}'", s))
                }),
        }
    }
}

/// Unique reference for one gateway exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderReference {
    purpose: ChargePurpose,
    epoch_millis: i64,
    reference: String,
}

impl OrderReference {
    /// Reference for the charge attempt of the cycle starting at `cycle_start`
    /// after `prior_failures` consecutive failures in that cycle.
    pub fn for_cycle(
        subscription_id: SubscriptionId,
        cycle_start: Timestamp,
        prior_failures: u32,
    ) -> Self {
        let purpose = if prior_failures == 0 {
            ChargePurpose::Charge
        } else {
            ChargePurpose::Retry(prior_failures)
        };
        Self {
            purpose,
            epoch_millis: cycle_start.epoch_millis(),
            reference: subscription_id.to_string(),
        }
    }

    /// Reference for a key issuance started by `user_id` at `requested_at`.
    pub fn for_issuance(user_id: &UserId, requested_at: Timestamp) -> Self {
        Self {
            purpose: ChargePurpose::KeyIssuance,
            epoch_millis: requested_at.epoch_millis(),
            reference: user_id.as_str().to_string(),
        }
    }

    pub fn purpose(&self) -> ChargePurpose {
        self.purpose
    }

    pub fn epoch_millis(&self) -> i64 {
        self.epoch_millis
    }

    /// The billing cycle this reference belongs to (charges only).
    pub fn cycle_start(&self) -> Option<Timestamp> {
        match self.purpose {
            ChargePurpose::KeyIssuance => None,
            _ => Timestamp::from_epoch_millis(self.epoch_millis),
        }
    }

    /// Subscription the charge was made for.
    pub fn subscription_id(&self) -> Option<SubscriptionId> {
        match self.purpose {
            ChargePurpose::KeyIssuance => None,
            _ => self.reference.parse().ok(),
        }
    }

    /// User who started the key issuance.
    pub fn issuing_user(&self) -> Option<UserId> {
        match self.purpose {
            ChargePurpose::KeyIssuance => UserId::new(self.reference.clone()).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for OrderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.purpose, self.epoch_millis, self.reference)
    }
}

impl FromStr for OrderReference {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, '_');
        let (purpose, millis, reference) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(m), Some(r)) if !r.is_empty() => (p, m, r),
            _ => {
                return Err(ValidationError::invalid_format(
                    "order_ref",
                    "expected {purpose}_{epochMillis}_{reference}",
                ))
            }
        };
        let epoch_millis = millis
            .parse::<i64>()
            .map_err(|_| ValidationError::invalid_format("order_ref", "epoch millis is not a number"))?;

        Ok(Self {
            purpose: purpose.parse()?,
            epoch_millis,
            reference: reference.to_string(),
        })
    }
}

impl TryFrom<String> for OrderReference {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OrderReference> for String {
    fn from(value: OrderReference) -> Self {
        value.to_string()
    }
}
