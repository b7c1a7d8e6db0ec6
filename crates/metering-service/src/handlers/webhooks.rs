//! Webhook handlers for the billing processor and the identity provider.
//!
//! Both handlers verify the signature before touching the body, and both
//! acknowledge event types they do not handle so the sender stops
//! redelivering. A bad signature, or an unconfigured signing secret,
//! rejects the event with zero side effects.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use metering_core::Account;
use metering_store::{EventOutcome, Store, StoreError};

use crate::billing::types::WebhookEnvelope;
use crate::crypto::{constant_time_eq, hmac_sha256_hex, verify_timestamped_signature};
use crate::error::ApiError;
use crate::state::AppState;

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
}

/// `POST /webhooks/billing`
pub async fn billing_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    // No secret means no way to authenticate the sender; reject rather
    // than let an unsigned event mutate the ledger.
    let secret = state
        .config
        .billing_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Internal("billing webhook secret not configured".into()))?;

    let signature = headers
        .get("billing-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::SignatureInvalid)?;

    if !verify_timestamped_signature(secret, &body, signature) {
        tracing::warn!("invalid billing webhook signature");
        return Err(ApiError::SignatureInvalid);
    }

    let envelope: WebhookEnvelope =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_id = %envelope.id,
        event_type = %envelope.event_type,
        "received billing webhook"
    );

    let Some(event) = envelope
        .to_billing_event()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    else {
        // Unhandled event type; acknowledge so the processor stops retrying.
        tracing::debug!(event_type = %envelope.event_type, "unhandled billing event type");
        return Ok(Json(WebhookResponse { received: true }));
    };

    match state.store.apply_billing_event(&event, &state.plans)? {
        EventOutcome::Applied(account) => {
            tracing::info!(
                event_id = event.event_id(),
                account_id = %account.account_id,
                plan = account.plan.as_str(),
                remaining = account.credits_remaining,
                "billing event applied"
            );
        }
        EventOutcome::Duplicate => {
            tracing::info!(event_id = event.event_id(), "billing event already applied");
        }
        EventOutcome::Dropped(reason) => {
            // Dropped events are still acknowledged; the event may
            // legitimately be stale and an error would loop the redelivery.
            tracing::warn!(event_id = event.event_id(), %reason, "billing event dropped");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

/// Identity webhook payload.
#[derive(Debug, Deserialize)]
pub struct IdentityWebhook {
    /// Event type, e.g. `user.created`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: IdentityData,
}

/// Identity event data.
#[derive(Debug, Deserialize)]
pub struct IdentityData {
    /// The identity-provider subject id; used directly as the account id.
    pub id: String,
}

/// `POST /webhooks/identity`
pub async fn identity_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let secret = state
        .config
        .identity_webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Internal("identity webhook secret not configured".into()))?;

    let signature = headers
        .get("x-identity-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::SignatureInvalid)?;

    let expected = hmac_sha256_hex(secret, &body);
    if !constant_time_eq(&expected, signature) {
        tracing::warn!("invalid identity webhook signature");
        return Err(ApiError::SignatureInvalid);
    }

    let webhook: IdentityWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let account_id = webhook
        .data
        .id
        .parse()
        .map_err(|_| ApiError::BadRequest("invalid account id".into()))?;

    match webhook.event_type.as_str() {
        "user.created" => {
            let account = Account::new(account_id);
            if state.store.create_account_if_absent(&account)? {
                tracing::info!(
                    account_id = %account.account_id,
                    "created free-tier account from identity webhook"
                );
            } else {
                // Redelivery; the existing balance must survive.
                tracing::info!(account_id = %account.account_id, "account already exists");
            }
        }
        "user.deleted" => match state.store.delete_account(&account_id) {
            Ok(()) => {
                tracing::info!(account_id = %account_id, "deleted account");
            }
            Err(StoreError::NotFound { .. }) => {
                tracing::info!(account_id = %account_id, "account already deleted");
            }
            Err(e) => return Err(e.into()),
        },
        other => {
            tracing::debug!(event_type = %other, "unhandled identity event type");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}
