//! Plan tier definitions and list prices.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Subscription plan tier.
///
/// `Basic` is the free tier and is never billed, whatever its
/// next-billing instant says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Basic,
    Pro,
    Business,
    Premium,
}

impl PlanTier {
    /// Monthly list price in minor currency units (KRW has no minor unit).
    pub fn list_price(&self) -> i64 {
        match self {
            PlanTier::Basic => 0,
            PlanTier::Pro => 9_900,
            PlanTier::Business => 29_000,
            PlanTier::Premium => 79_000,
        }
    }

    /// Returns true if subscriptions on this tier are charged.
    pub fn is_billable(&self) -> bool {
        !matches!(self, PlanTier::Basic)
    }

    /// Human-readable name, used for the gateway's goods name.
    pub fn display_name(&self) -> &'static str {
        match self {
            PlanTier::Basic => "Basic",
            PlanTier::Pro => "Pro",
            PlanTier::Business => "Business",
            PlanTier::Premium => "Premium",
        }
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Basic => "basic",
            PlanTier::Pro => "pro",
            PlanTier::Business => "business",
            PlanTier::Premium => "premium",
        }
    }
}

impl FromStr for PlanTier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(PlanTier::Basic),
            "pro" => Ok(PlanTier::Pro),
            "business" => Ok(PlanTier::Business),
            "premium" => Ok(PlanTier::Premium),
            other => Err(ValidationError::invalid_format(
                "plan",
                format!("unknown plan tier '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_prices_match_catalogue() {
        assert_eq!(PlanTier::Basic.list_price(), 0);
        assert_eq!(PlanTier::Pro.list_price(), 9_900);
        assert_eq!(PlanTier::Business.list_price(), 29_000);
        assert_eq!(PlanTier::Premium.list_price(), 79_000);
    }

    #[test]
    fn only_basic_is_not_billable() {
        assert!(!PlanTier::Basic.is_billable());
        assert!(PlanTier::Pro.is_billable());
        assert!(PlanTier::Business.is_billable());
        assert!(PlanTier::Premium.is_billable());
    }

    #[test]
    fn parses_storage_representation() {
        for tier in [PlanTier::Basic, PlanTier::Pro, PlanTier::Business, PlanTier::Premium] {
            assert_eq!(tier.as_str().parse::<PlanTier>().unwrap(), tier);
        }
        assert!("enterprise".parse::<PlanTier>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PlanTier::Premium).unwrap(), "\"premium\"");
    }
}
