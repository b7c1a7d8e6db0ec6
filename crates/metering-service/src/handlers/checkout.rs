//! Checkout and billing-portal session handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthAccount;
use crate::billing::BillingClient;
use crate::error::ApiError;
use crate::handlers::credits::load_or_create_account;
use crate::state::AppState;

/// Checkout request.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Target plan: "standard" or "premium".
    pub plan: String,
}

/// Session response for both checkout and portal.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// URL to redirect the user to.
    pub url: String,
}

fn billing_client(state: &AppState) -> Result<&Arc<BillingClient>, ApiError> {
    state
        .billing
        .as_ref()
        .ok_or_else(|| ApiError::Upstream("billing processor not configured".into()))
}

/// `POST /v1/billing/checkout`
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    auth: AuthAccount,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let price_id = match request.plan.as_str() {
        "standard" => &state.config.price_standard_id,
        "premium" => &state.config.price_premium_id,
        other => {
            return Err(ApiError::BadRequest(format!("unknown plan: {other}")));
        }
    };

    let account = load_or_create_account(&state, &auth.account_id)?;

    // A second paid checkout is rejected, not merged; plan changes go
    // through the processor's portal against the existing subscription.
    if account.has_active_subscription() {
        return Err(ApiError::DuplicateSubscription);
    }

    let session = billing_client(&state)?
        .create_subscription_checkout(
            auth.account_id.as_str(),
            price_id,
            &format!("{}/billing/success", state.config.frontend_url),
            &format!("{}/billing/cancelled", state.config.frontend_url),
        )
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Upstream("checkout session has no URL".into()))?;

    tracing::info!(
        account_id = %auth.account_id,
        plan = %request.plan,
        session_id = %session.id,
        "created checkout session"
    );

    Ok(Json(SessionResponse { url }))
}

/// `POST /v1/billing/portal`
pub async fn create_portal(
    State(state): State<Arc<AppState>>,
    auth: AuthAccount,
) -> Result<Json<SessionResponse>, ApiError> {
    let account = load_or_create_account(&state, &auth.account_id)?;

    let subject = account
        .billing_subject_id
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("no billing history for this account".into()))?;

    let session = billing_client(&state)?
        .create_portal_session(subject, &format!("{}/billing", state.config.frontend_url))
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    Ok(Json(SessionResponse { url: session.url }))
}
