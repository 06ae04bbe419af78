//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, state machine)
//! - `billing` - Subscriptions, billing keys, ledger attempts, retry policy
//!   and billing events

pub mod billing;
pub mod foundation;
