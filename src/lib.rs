//! Recurring Billing - scheduled card charging against stored billing keys
//!
//! Users register a card once through the gateway's payment window; the
//! resulting billing key is charged every billing cycle by the scheduler,
//! with an idempotent ledger guarding against double charges.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod scheduler;
