//! Digest and result-code helpers shared by the gateway protocols.
//!
//! # Security
//!
//! Signatures are compared in constant time on their decoded bytes. A digest
//! that is not valid hex never matches.

use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::domain::billing::{BillingError, BillingToken, GatewayError, GatewayErrorKind};
use crate::domain::foundation::Timestamp;

pub use crate::ports::is_success_code;

/// Decline code that, combined with [`INVALID_KEY_MARKER`], means the gateway
/// no longer knows the stored billing key.
const INVALID_KEY_CODE: &str = "01";
const INVALID_KEY_MARKER: &str = "1195";

/// Korean standard time offset used by the v2 timestamp format.
const KST_OFFSET_HOURS: i64 = 9;

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

pub fn sha512_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.as_bytes()))
}

/// Constant-time comparison of two hex digests.
pub fn signatures_match(expected_hex: &str, provided_hex: &str) -> bool {
    let (Ok(expected), Ok(provided)) = (
        hex::decode(expected_hex.trim()),
        hex::decode(provided_hex.trim()),
    ) else {
        return false;
    };
    expected.len() == provided.len() && expected.ct_eq(&provided).unwrap_u8() == 1
}

/// Refuses tokens that only authorize a single in-session charge.
pub fn ensure_recurring_capable(token: &BillingToken) -> Result<(), BillingError> {
    if token.kind().is_recurring_capable() {
        Ok(())
    } else {
        tracing::warn!(
            token = %token.redacted(),
            "Refusing recurring charge against one-time token"
        );
        Err(BillingError::NotRecurringCapable)
    }
}

/// Turns a non-success reply into a gateway error, singling out invalid keys.
pub fn classify_decline(code: &str, message: &str, raw_body: &str) -> GatewayError {
    let kind = if code.trim() == INVALID_KEY_CODE && message.contains(INVALID_KEY_MARKER) {
        GatewayErrorKind::InvalidBillingKey
    } else {
        GatewayErrorKind::Declined
    };
    GatewayError::new(kind, code.trim(), message, Some(raw_body.to_string()))
}

/// Maps a transport failure onto the gateway error taxonomy.
pub fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::timeout()
    } else {
        GatewayError::network(err.to_string())
    }
}

/// `yyyyMMddHHmmss` in Korean standard time.
pub fn kst_timestamp(at: Timestamp) -> String {
    let local = at.as_datetime().naive_utc() + chrono::Duration::hours(KST_OFFSET_HOURS);
    local.format("%Y%m%d%H%M%S").to_string()
}
