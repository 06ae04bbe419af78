//! Billing domain - subscriptions, billing keys, the payment ledger model and
//! the failure policy that ties them together.

mod billing_key;
mod errors;
mod events;
mod order_reference;
mod payment_attempt;
mod period;
mod plan;
mod retry_policy;
mod status;
mod subscription;

pub use billing_key::{
    mask_card_number, BillingKey, BillingToken, CardMeta, KeyStatus, NewBillingKey, TokenKind,
    ONE_TIME_TOKEN_PREFIX,
};
pub use errors::{BillingError, GatewayError, GatewayErrorKind};
pub use events::{BillingEvent, SuspensionReason};
pub use order_reference::{ChargePurpose, OrderReference};
pub use payment_attempt::{AttemptOutcome, AttemptResult, NewAttempt, PaymentAttempt};
pub use period::BillingPeriod;
pub use plan::PlanTier;
pub use retry_policy::{FailureAction, RetryPolicy};
pub use status::SubscriptionStatus;
pub use subscription::Subscription;
