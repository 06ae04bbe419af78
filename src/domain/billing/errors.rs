//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Configuration | 500 |
//! | NotRecurringCapable | 422 |
//! | Protocol | 502 |
//! | Gateway | 502 |
//! | Conflict | 409 |
//! | NotFound | 404 |
//! | InvalidState | 409 |
//! | Declined | 402 |
//! | RegisteredNotSaved | 500 |
//! | Validation | 400 |
//! | Storage | 500 |

use thiserror::Error;

use crate::domain::foundation::ValidationError;

/// Errors produced by the billing engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Missing or unusable credentials. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The stored token can only be used for one in-session charge.
    #[error("billing token is one-time only and cannot be charged on a schedule")]
    NotRecurringCapable,

    /// Signature mismatch or structurally invalid gateway exchange.
    #[error("gateway protocol error: {0}")]
    Protocol(String),

    /// Decline, network failure, timeout or bad gateway response.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Duplicate order reference or token.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The gateway reported a non-success code on a key issuance callback.
    #[error("key issuance declined [{code}]: {message}")]
    Declined { code: String, message: String },

    /// The gateway issued a billing key but it could not be stored locally.
    #[error("billing key registered with the gateway but not saved: {reason}")]
    RegisteredNotSaved { reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(String),
}

impl BillingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BillingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        BillingError::Protocol(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        BillingError::Conflict(reason.into())
    }

    pub fn storage(reason: impl ToString) -> Self {
        BillingError::Storage(reason.to_string())
    }

    /// Stable machine-readable code, used in redirects and response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::Configuration(_) => "CONFIGURATION_ERROR",
            BillingError::NotRecurringCapable => "NOT_RECURRING_CAPABLE",
            BillingError::Protocol(_) => "PROTOCOL_ERROR",
            BillingError::Gateway(_) => "GATEWAY_ERROR",
            BillingError::Conflict(_) => "CONFLICT",
            BillingError::NotFound { .. } => "NOT_FOUND",
            BillingError::InvalidState(_) => "INVALID_STATE",
            BillingError::Declined { .. } => "DECLINED",
            BillingError::RegisteredNotSaved { .. } => "REGISTERED_NOT_SAVED",
            BillingError::Validation(_) => "VALIDATION_FAILED",
            BillingError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns true if a later attempt may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Gateway(err) => err.kind.is_retryable(),
            BillingError::Storage(_) => true,
            _ => false,
        }
    }

    /// Returns true if the user must register a new card before billing resumes.
    pub fn requires_reregistration(&self) -> bool {
        match self {
            BillingError::NotRecurringCapable => true,
            BillingError::Gateway(err) => err.kind == GatewayErrorKind::InvalidBillingKey,
            _ => false,
        }
    }
}

/// Classification of a normalized gateway failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// The gateway answered and refused the charge.
    Declined,
    /// The gateway no longer recognizes the stored billing key.
    InvalidBillingKey,
    /// Connection could not be established or was reset.
    Network,
    /// No answer within the request budget.
    Timeout,
    /// Non-2xx HTTP status.
    HttpStatus,
    /// Body could not be decoded.
    MalformedResponse,
}

impl GatewayErrorKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GatewayErrorKind::InvalidBillingKey)
    }
}

/// Normalized failure from the external gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gateway error [{code}]: {message}")]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub code: String,
    pub message: String,
    pub raw_body: Option<String>,
}

impl GatewayError {
    pub fn new(
        kind: GatewayErrorKind,
        code: impl Into<String>,
        message: impl Into<String>,
        raw_body: Option<String>,
    ) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            raw_body,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Network, "NETWORK", message, None)
    }

    pub fn timeout() -> Self {
        Self::new(
            GatewayErrorKind::Timeout,
            "TIMEOUT",
            "gateway did not answer in time",
            None,
        )
    }

    pub fn http_status(status: u16, raw_body: impl Into<String>) -> Self {
        Self::new(
            GatewayErrorKind::HttpStatus,
            format!("HTTP_{}", status),
            format!("gateway returned HTTP {}", status),
            Some(raw_body.into()),
        )
    }

    pub fn malformed(reason: impl Into<String>, raw_body: impl Into<String>) -> Self {
        Self::new(
            GatewayErrorKind::MalformedResponse,
            "MALFORMED_RESPONSE",
            reason,
            Some(raw_body.into()),
        )
    }

    pub fn declined(code: impl Into<String>, message: impl Into<String>, raw_body: Option<String>) -> Self {
        Self::new(GatewayErrorKind::Declined, code, message, raw_body)
    }
}
