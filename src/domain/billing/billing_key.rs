//! Billing keys: gateway-issued references to a stored card.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{BillingKeyId, Timestamp, UserId, ValidationError};

/// Tokens with this prefix come from the standard payment window and only
/// authorize a single in-session charge.
pub const ONE_TIME_TOKEN_PREFIX: &str = "StdpayCARD";

/// Which gateway family issued a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OneTime,
    Recurring,
}

impl TokenKind {
    /// Classifies a token by its prefix.
    pub fn classify(token: &str) -> Self {
        if token.starts_with(ONE_TIME_TOKEN_PREFIX) {
            TokenKind::OneTime
        } else {
            TokenKind::Recurring
        }
    }

    pub fn is_recurring_capable(&self) -> bool {
        matches!(self, TokenKind::Recurring)
    }
}

/// Opaque billing token. Debug and Display never print the full value.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BillingToken(String);

impl BillingToken {
    pub fn new(token: impl Into<String>) -> Result<Self, ValidationError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(ValidationError::empty_field("billing_token"));
        }
        Ok(Self(token))
    }

    pub fn kind(&self) -> TokenKind {
        TokenKind::classify(&self.0)
    }

    /// Full token, for gateway requests and storage only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short prefix safe for logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(10).collect();
        format!("{}...", prefix)
    }
}

impl fmt::Debug for BillingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BillingToken({})", self.redacted())
    }
}

impl fmt::Display for BillingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.redacted())
    }
}

impl TryFrom<String> for BillingToken {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BillingToken> for String {
    fn from(value: BillingToken) -> Self {
        value.0
    }
}

/// Masks a card number down to its first and last four digits.
///
/// Numbers the gateway already masked (containing `*`) are kept as given.
pub fn mask_card_number(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('*') {
        return trimmed.to_string();
    }
    let digits: Vec<char> = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    let len = digits.len();
    if len <= 4 {
        return "*".repeat(len);
    }
    if len <= 8 {
        let mut masked = "*".repeat(len - 4);
        masked.extend(&digits[len - 4..]);
        return masked;
    }
    let mut masked: String = digits[..4].iter().collect();
    masked.push_str(&"*".repeat(len - 8));
    masked.extend(&digits[len - 4..]);
    masked
}

/// Card metadata returned alongside an issued key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMeta {
    pub masked_number: Option<String>,
    pub label: Option<String>,
}

impl CardMeta {
    /// Builds card metadata, masking the number if the gateway sent it in clear.
    pub fn new(card_number: Option<&str>, label: Option<&str>) -> Self {
        Self {
            masked_number: card_number
                .filter(|n| !n.trim().is_empty())
                .map(mask_card_number),
            label: label
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        }
    }
}

/// Lifecycle status of a billing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Active => "active",
            KeyStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for KeyStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(KeyStatus::Active),
            "inactive" => Ok(KeyStatus::Inactive),
            other => Err(ValidationError::invalid_format(
                "key_status",
                format!("unknown key status '{}'", other),
            )),
        }
    }
}

/// A stored billing key.
///
/// # Invariants
///
/// - at most one `Active` key per user
/// - `token` is globally unique
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingKey {
    pub id: BillingKeyId,
    pub user_id: UserId,
    pub token: BillingToken,
    pub card: CardMeta,
    pub status: KeyStatus,
    pub created_at: Timestamp,
    pub deactivated_at: Option<Timestamp>,
}

impl BillingKey {
    pub fn is_active(&self) -> bool {
        self.status == KeyStatus::Active
    }
}

/// Input for registering a freshly issued key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBillingKey {
    pub user_id: UserId,
    pub token: BillingToken,
    pub card: CardMeta,
}
