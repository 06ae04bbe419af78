//! Billing HTTP module.
//!
//! Exposes key issuance, subscription management and the admin billing
//! trigger over REST.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{BillingAppState, RedirectTargets};
pub use routes::{admin_routes, billing_router, billing_routes};
