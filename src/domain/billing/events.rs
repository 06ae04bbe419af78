//! Billing outcomes published to the notification collaborator.

use serde::Serialize;

use crate::domain::foundation::{SubscriptionId, Timestamp, UserId};

use super::OrderReference;

/// Why billing was halted for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "failures")]
pub enum SuspensionReason {
    MissingBillingKey,
    NotRecurringCapable,
    InvalidBillingKey,
    RepeatedFailures(u32),
}

/// Event handed to the notifier. Delivery is one-way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BillingEvent {
    ChargeSucceeded {
        subscription_id: SubscriptionId,
        user_id: UserId,
        amount: i64,
        order_ref: OrderReference,
        next_billing_at: Timestamp,
    },
    ChargeFailed {
        subscription_id: SubscriptionId,
        user_id: UserId,
        order_ref: OrderReference,
        failures: u32,
        code: String,
        message: String,
    },
    SubscriptionSuspended {
        subscription_id: SubscriptionId,
        user_id: UserId,
        reason: SuspensionReason,
    },
    KeyRegistered {
        user_id: UserId,
        masked_card_number: Option<String>,
    },
    RegisteredNotSaved {
        user_id: UserId,
        order_ref: OrderReference,
    },
}

impl BillingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            BillingEvent::ChargeSucceeded { .. } => "billing.charge_succeeded",
            BillingEvent::ChargeFailed { .. } => "billing.charge_failed",
            BillingEvent::SubscriptionSuspended { .. } => "billing.subscription_suspended",
            BillingEvent::KeyRegistered { .. } => "billing.key_registered",
            BillingEvent::RegisteredNotSaved { .. } => "billing.registered_not_saved",
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            BillingEvent::ChargeSucceeded { user_id, .. }
            | BillingEvent::ChargeFailed { user_id, .. }
            | BillingEvent::SubscriptionSuspended { user_id, .. }
            | BillingEvent::KeyRegistered { user_id, .. }
            | BillingEvent::RegisteredNotSaved { user_id, .. } => user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suspension_event_serializes_with_reason() {
        let event = BillingEvent::SubscriptionSuspended {
            subscription_id: SubscriptionId::new(),
            user_id: UserId::new("user-1").unwrap(),
            reason: SuspensionReason::RepeatedFailures(3),
        };

        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "subscription_suspended");
        assert_eq!(json["reason"]["kind"], "repeated_failures");
        assert_eq!(json["reason"]["failures"], 3);
        assert_eq!(event.event_type(), "billing.subscription_suspended");
    }
}
