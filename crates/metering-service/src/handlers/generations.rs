//! Metered generation handler.
//!
//! One request walks the full pipeline: throttle, soft quota, plan gate,
//! reserve, provider call, then commit or refund. Every early exit happens
//! before the balance is touched; after the reservation there are exactly
//! two ways out.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use metering_core::OperationKind;
use metering_store::Store;

use crate::auth::AuthAccount;
use crate::error::ApiError;
use crate::handlers::credits::load_or_create_account;
use crate::state::AppState;
use crate::throttle::RateDecision;

/// Route key for the rate limiter.
const GENERATIONS_ROUTE: &str = "/v1/generations";

/// Generation request.
#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    /// "text_generation" or "image_synthesis".
    pub kind: String,
    /// Prompt or input payload, passed through to the provider.
    pub input: String,
    /// Credit cost override; defaults to the configured cost for the kind.
    #[serde(default)]
    pub cost: Option<i64>,
}

/// Generation response.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    /// Provider output.
    pub output: String,
    /// Credits charged.
    pub cost_credits: i64,
    /// Balance after the charge.
    pub credits_remaining: i64,
}

fn parse_kind(kind: &str) -> Result<OperationKind, ApiError> {
    match kind {
        "text_generation" => Ok(OperationKind::TextGeneration),
        "image_synthesis" => Ok(OperationKind::ImageSynthesis),
        other => Err(ApiError::BadRequest(format!(
            "unknown operation kind: {other}"
        ))),
    }
}

/// `POST /v1/generations`
pub async fn create_generation(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    auth: AuthAccount,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let kind = parse_kind(&request.kind)?;

    // Throttle before anything downstream sees the request. The caller key
    // is the peer address where available, else the account itself.
    let caller = connect_info.map_or_else(
        || auth.account_id.to_string(),
        |ConnectInfo(addr)| addr.ip().to_string(),
    );
    if let RateDecision::Limited {
        retry_after_seconds,
    } = state.limiter.check(&caller, GENERATIONS_ROUTE)
    {
        return Err(ApiError::RateLimited {
            retry_after_seconds,
        });
    }

    let account = load_or_create_account(&state, &auth.account_id)?;

    // Image synthesis is gated to paid tiers and a daily soft cap, counted
    // per attempt regardless of outcome or cost.
    if kind == OperationKind::ImageSynthesis {
        if !account.has_active_subscription() {
            return Err(ApiError::PlanRequired);
        }

        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map_or_else(Utc::now, |t| t.and_utc());
        let used = state
            .store
            .count_usage_since(&auth.account_id, kind, midnight)?;
        if used >= state.config.daily_image_cap {
            return Err(ApiError::QuotaExceeded {
                used,
                cap: state.config.daily_image_cap,
            });
        }
    }

    let cost = request.cost.unwrap_or_else(|| state.config.cost_of(kind));
    let reservation = state.guard.reserve(&auth.account_id, kind, cost)?;

    match state.provider.generate(kind, &request.input).await {
        Ok(output) => {
            state.guard.commit(&reservation)?;
            let remaining = state
                .store
                .get_account(&auth.account_id)?
                .map_or(0, |a| a.credits_remaining);

            tracing::info!(
                account_id = %auth.account_id,
                kind = kind.as_str(),
                cost,
                remaining,
                "generation committed"
            );

            Ok(Json(GenerationResponse {
                output,
                cost_credits: cost,
                credits_remaining: remaining,
            }))
        }
        Err(e) => {
            let remaining = state.guard.refund(&reservation)?;
            tracing::warn!(
                account_id = %auth.account_id,
                kind = kind.as_str(),
                cost,
                remaining,
                error = %e,
                "provider failed, reservation refunded"
            );
            Err(ApiError::Upstream(e.to_string()))
        }
    }
}
