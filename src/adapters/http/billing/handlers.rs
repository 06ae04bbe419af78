//! HTTP handlers for billing endpoints.
//!
//! These handlers connect Axum routes to the billing command/query handlers.
//! The gateway return endpoint answers with a redirect; everything else
//! answers with JSON.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::{Form, Json, Query, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::application::handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CompleteKeyIssuanceCommand,
    CompleteKeyIssuanceHandler, GetActiveKeyHandler, GetActiveKeyQuery,
    PrepareKeyIssuanceCommand, PrepareKeyIssuanceHandler, RemoveBillingKeyCommand,
    RemoveBillingKeyHandler, StartSubscriptionCommand, StartSubscriptionHandler,
};
use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{BillingKeyStore, Clock, GatewayClient, Notifier, SubscriptionStore};
use crate::scheduler::{BillingScheduler, TickOutcome};

use super::dto::{
    ErrorResponse, IssuanceReturnParams, RemoveKeyResponse, StartSubscriptionRequest,
    SubscriptionResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Where the browser lands after a key issuance round trip.
#[derive(Debug, Clone)]
pub struct RedirectTargets {
    /// Sent to the gateway as the return address of the payment window.
    pub return_url: String,
    pub success_url: String,
    pub failure_url: String,
}

/// Shared application state containing all dependencies.
///
/// Cloned per request; every dependency is Arc-wrapped.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub keys: Arc<dyn BillingKeyStore>,
    pub gateway: Arc<dyn GatewayClient>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub scheduler: Arc<BillingScheduler>,
    pub redirects: RedirectTargets,
    /// Required on admin endpoints. Admin endpoints are closed when unset.
    pub admin_token: Option<SecretString>,
}

impl BillingAppState {
    pub fn prepare_issuance_handler(&self) -> PrepareKeyIssuanceHandler {
        PrepareKeyIssuanceHandler::new(
            self.gateway.clone(),
            self.clock.clone(),
            self.redirects.return_url.clone(),
        )
    }

    pub fn complete_issuance_handler(&self) -> CompleteKeyIssuanceHandler {
        CompleteKeyIssuanceHandler::new(
            self.gateway.clone(),
            self.keys.clone(),
            self.subscriptions.clone(),
            self.notifier.clone(),
            self.clock.clone(),
        )
    }

    pub fn active_key_handler(&self) -> GetActiveKeyHandler {
        GetActiveKeyHandler::new(self.keys.clone())
    }

    pub fn remove_key_handler(&self) -> RemoveBillingKeyHandler {
        RemoveBillingKeyHandler::new(self.keys.clone(), self.clock.clone())
    }

    pub fn start_subscription_handler(&self) -> StartSubscriptionHandler {
        StartSubscriptionHandler::new(self.subscriptions.clone(), self.clock.clone())
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(self.subscriptions.clone(), self.clock.clone())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Caller Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from request.
///
/// Identity is established by the fronting proxy, which forwards the user id
/// in the `X-User-Id` header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("X-User-Id")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

/// Operator holding the admin token.
#[derive(Debug, Clone, Copy)]
pub struct AdminCaller;

pub enum AdminRejection {
    Disabled,
    Forbidden,
}

impl IntoResponse for AdminRejection {
    fn into_response(self) -> Response {
        match self {
            AdminRejection::Disabled => (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "ADMIN_DISABLED",
                    "Admin endpoints are not enabled",
                )),
            )
                .into_response(),
            AdminRejection::Forbidden => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("INVALID_ADMIN_TOKEN", "Invalid admin token")),
            )
                .into_response(),
        }
    }
}

#[async_trait]
impl axum::extract::FromRequestParts<BillingAppState> for AdminCaller {
    type Rejection = AdminRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &BillingAppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.admin_token.as_ref().ok_or(AdminRejection::Disabled)?;
        let presented = parts
            .headers
            .get("X-Admin-Token")
            .map(|v| v.as_bytes())
            .ok_or(AdminRejection::Forbidden)?;

        if bool::from(expected.expose_secret().as_bytes().ct_eq(presented)) {
            Ok(AdminCaller)
        } else {
            tracing::warn!("Rejected admin request with invalid token");
            Err(AdminRejection::Forbidden)
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Billing Key Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/keys/issuance - Sign the payment-window form for a new card
pub async fn prepare_key_issuance(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.prepare_issuance_handler();
    let result = handler
        .handle(PrepareKeyIssuanceCommand {
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(result))
}

/// GET /billing/return - Gateway return with the result in the query string
pub async fn issuance_return_query(
    State(state): State<BillingAppState>,
    Query(params): Query<IssuanceReturnParams>,
) -> Redirect {
    complete_issuance(&state, params.into()).await
}

/// POST /billing/return - Gateway return with the result in a form body
pub async fn issuance_return_form(
    State(state): State<BillingAppState>,
    Form(params): Form<IssuanceReturnParams>,
) -> Redirect {
    complete_issuance(&state, params.into()).await
}

async fn complete_issuance(state: &BillingAppState, cmd: CompleteKeyIssuanceCommand) -> Redirect {
    let order_ref = cmd.order_ref.clone();
    match state.complete_issuance_handler().handle(cmd).await {
        Ok(result) => {
            let mut params = vec![
                ("resultCode", "0000".to_string()),
                ("resultMsg", "card registered".to_string()),
            ];
            if let Some(subscription_id) = result.reactivated {
                params.push(("reactivated", subscription_id.to_string()));
            }
            redirect_with(&state.redirects.success_url, &params)
        }
        Err(e) => {
            tracing::warn!(order_ref = %order_ref, error = %e, "Key issuance did not complete");
            let (code, message) = match &e {
                BillingError::Declined { code, message } => (code.clone(), message.clone()),
                other => (other.code().to_string(), public_message(other)),
            };
            redirect_with(
                &state.redirects.failure_url,
                &[("resultCode", code), ("resultMsg", message)],
            )
        }
    }
}

fn redirect_with(base: &str, params: &[(&str, String)]) -> Redirect {
    match reqwest::Url::parse_with_params(base, params.iter().map(|(k, v)| (*k, v.as_str()))) {
        Ok(url) => Redirect::to(url.as_str()),
        Err(e) => {
            tracing::error!(url = %base, error = %e, "Invalid redirect target");
            Redirect::to(base)
        }
    }
}

/// GET /billing/keys/active - Masked view of the active billing key
pub async fn get_active_key(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.active_key_handler();
    let view = handler
        .handle(GetActiveKeyQuery {
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(view))
}

/// DELETE /billing/keys - Deactivate the stored billing key
pub async fn remove_billing_key(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.remove_key_handler();
    let result = handler
        .handle(RemoveBillingKeyCommand {
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(RemoveKeyResponse {
        removed: result.removed,
    }))
}

// ════════════════════════════════════════════════════════════════════════════════
// Subscription Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/subscriptions - Start a paid subscription
pub async fn start_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
    Json(request): Json<StartSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.start_subscription_handler();
    let subscription = handler
        .handle(StartSubscriptionCommand {
            user_id: user.user_id,
            plan: request.plan,
            price: request.price,
            first_billing_at: None,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(subscription)),
    ))
}

/// POST /billing/subscriptions/cancel - Cancel at period end
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.cancel_subscription_handler();
    let subscription = handler
        .handle(CancelSubscriptionCommand {
            user_id: user.user_id,
        })
        .await?;
    Ok(Json(SubscriptionResponse::from(subscription)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Admin Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /admin/billing/run - Run one scheduler tick now
pub async fn run_billing_now(
    State(state): State<BillingAppState>,
    _admin: AdminCaller,
) -> Result<Response, BillingApiError> {
    match state.scheduler.try_tick().await? {
        TickOutcome::Completed(report) => Ok(Json(report).into_response()),
        TickOutcome::Skipped => Ok((
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(
                "TICK_IN_PROGRESS",
                "A billing run is already in progress",
            )),
        )
            .into_response()),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error wrapper for converting billing errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(BillingError);

impl From<BillingError> for BillingApiError {
    fn from(err: BillingError) -> Self {
        Self(err)
    }
}

/// Message safe to show outside the service.
fn public_message(err: &BillingError) -> String {
    match err {
        BillingError::Configuration(_) | BillingError::Storage(_) => {
            "An internal error occurred".to_string()
        }
        BillingError::RegisteredNotSaved { .. } => {
            "Your card was registered but could not be saved; please retry registration"
                .to_string()
        }
        BillingError::Gateway(_) => "The payment gateway is unavailable".to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BillingError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BillingError::NotRecurringCapable => StatusCode::UNPROCESSABLE_ENTITY,
            BillingError::Protocol(_) => StatusCode::BAD_GATEWAY,
            BillingError::Gateway(_) => StatusCode::BAD_GATEWAY,
            BillingError::Conflict(_) => StatusCode::CONFLICT,
            BillingError::NotFound { .. } => StatusCode::NOT_FOUND,
            BillingError::InvalidState(_) => StatusCode::CONFLICT,
            BillingError::Declined { .. } => StatusCode::PAYMENT_REQUIRED,
            BillingError::RegisteredNotSaved { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            BillingError::Validation(_) => StatusCode::BAD_REQUEST,
            BillingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Billing request failed");
        }

        let error = ErrorResponse::new(self.0.code(), public_message(&self.0));
        (status, Json(error)).into_response()
    }
}
