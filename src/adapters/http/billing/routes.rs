//! Axum router configuration for billing endpoints.
//!
//! This module defines the route structure for the billing API and wires
//! each route to its handler.

use axum::{
    routing::{delete, get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, get_active_key, issuance_return_form, issuance_return_query,
    prepare_key_issuance, remove_billing_key, run_billing_now, start_subscription,
    BillingAppState,
};

/// Create the billing API router, mounted at `/billing`.
///
/// # Routes
///
/// ## User Endpoints (require `X-User-Id`)
/// - `POST /keys/issuance` - Sign the payment-window form
/// - `GET /keys/active` - Masked active billing key
/// - `DELETE /keys` - Deactivate the billing key
/// - `POST /subscriptions` - Start a paid subscription
/// - `POST /subscriptions/cancel` - Cancel at period end
///
/// ## Gateway Return (no auth, signature verified by the gateway exchange)
/// - `GET /return`, `POST /return` - Complete key issuance and redirect
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/keys/issuance", post(prepare_key_issuance))
        .route("/keys/active", get(get_active_key))
        .route("/keys", delete(remove_billing_key))
        .route("/subscriptions", post(start_subscription))
        .route("/subscriptions/cancel", post(cancel_subscription))
        .route("/return", get(issuance_return_query).post(issuance_return_form))
}

/// Create the admin router, mounted at `/admin/billing`.
///
/// # Routes
/// - `POST /run` - Run one billing tick now (requires `X-Admin-Token`)
pub fn admin_routes() -> Router<BillingAppState> {
    Router::new().route("/run", post(run_billing_now))
}

/// Create the complete billing module router.
///
/// ```ignore
/// let app = billing_router().with_state(state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", billing_routes())
        .nest("/admin/billing", admin_routes())
}
