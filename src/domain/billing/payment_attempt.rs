//! Payment ledger entries.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::foundation::{
    AttemptId, StateMachine, SubscriptionId, Timestamp, UserId, ValidationError,
};

use super::OrderReference;

/// Outcome of a charge attempt. Only `Pending` may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Pending,
    Success,
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Pending => "pending",
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failed => "failed",
        }
    }
}

impl StateMachine for AttemptOutcome {
    fn successors(&self) -> &'static [Self] {
        use AttemptOutcome::*;
        match self {
            Pending => &[Success, Failed],
            Success | Failed => &[],
        }
    }
}

impl FromStr for AttemptOutcome {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AttemptOutcome::Pending),
            "success" => Ok(AttemptOutcome::Success),
            "failed" => Ok(AttemptOutcome::Failed),
            other => Err(ValidationError::invalid_format(
                "outcome",
                format!("unknown attempt outcome '{}'", other),
            )),
        }
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the append-only payment ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAttempt {
    pub id: AttemptId,
    pub order_ref: OrderReference,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub amount: i64,
    pub outcome: AttemptOutcome,
    pub transaction_id: Option<String>,
    pub raw_response: Option<String>,
    pub created_at: Timestamp,
    pub finalized_at: Option<Timestamp>,
}

impl PaymentAttempt {
    /// Builds the pending row written before the gateway is called.
    pub fn pending(new: NewAttempt) -> Self {
        Self {
            id: AttemptId::new(),
            order_ref: new.order_ref,
            subscription_id: new.subscription_id,
            user_id: new.user_id,
            amount: new.amount,
            outcome: AttemptOutcome::Pending,
            transaction_id: None,
            raw_response: None,
            created_at: new.requested_at,
            finalized_at: None,
        }
    }

    /// Applies the final outcome. Fails if the row is already finalized.
    pub fn finalize(&mut self, result: AttemptResult, at: Timestamp) -> Result<(), ValidationError> {
        self.outcome = self.outcome.transition_to(result.outcome)?;
        self.transaction_id = result.transaction_id;
        self.raw_response = result.raw_response;
        self.finalized_at = Some(at);
        Ok(())
    }
}

/// Input for `PaymentLedger::record_attempt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub order_ref: OrderReference,
    pub subscription_id: SubscriptionId,
    pub user_id: UserId,
    pub amount: i64,
    pub requested_at: Timestamp,
}

/// Final outcome written by `PaymentLedger::finalize_attempt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub outcome: AttemptOutcome,
    pub transaction_id: Option<String>,
    pub raw_response: Option<String>,
}

impl AttemptResult {
    pub fn success(transaction_id: impl Into<String>, raw_response: Option<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Success,
            transaction_id: Some(transaction_id.into()),
            raw_response,
        }
    }

    pub fn failed(raw_response: Option<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Failed,
            transaction_id: None,
            raw_response,
        }
    }
}
