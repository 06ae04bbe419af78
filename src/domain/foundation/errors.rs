//! Validation failures raised while building domain values.

use thiserror::Error;

/// A domain value was rejected. Always names the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Field '{field}' must be between {min} and {max}, got {actual}")]
    OutOfRange {
        field: String,
        min: i64,
        max: i64,
        actual: i64,
    },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

impl ValidationError {
    pub fn empty_field(field: impl Into<String>) -> Self {
        ValidationError::EmptyField { field: field.into() }
    }

    pub fn out_of_range(field: impl Into<String>, min: i64, max: i64, actual: i64) -> Self {
        ValidationError::OutOfRange {
            field: field.into(),
            min,
            max,
            actual,
        }
    }

    pub fn invalid_format(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidFormat {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::EmptyField { field }
            | ValidationError::OutOfRange { field, .. }
            | ValidationError::InvalidFormat { field, .. } => field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_field_message_names_field() {
        let err = ValidationError::empty_field("user_id");
        assert_eq!(format!("{}", err), "Field 'user_id' cannot be empty");
    }

    #[test]
    fn out_of_range_message_shows_bounds() {
        let err = ValidationError::out_of_range("amount", 1, 10_000_000, 0);
        assert_eq!(
            format!("{}", err),
            "Field 'amount' must be between 1 and 10000000, got 0"
        );
    }

    #[test]
    fn field_is_exposed_for_every_variant() {
        let err = ValidationError::invalid_format("order_ref", "missing separator");
        assert_eq!(err.field(), "order_ref");
        assert_eq!(ValidationError::empty_field("card_token").field(), "card_token");
        assert_eq!(ValidationError::out_of_range("amount", 1, 2, 3).field(), "amount");
    }
}
