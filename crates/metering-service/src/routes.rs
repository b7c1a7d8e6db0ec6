//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{checkout, credits, generations, health, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for the metered API.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Metered API (Bearer JWT auth)
/// - `GET /v1/credits/balance` - Current balance and plan
/// - `GET /v1/usage` - Usage history, newest first
/// - `POST /v1/generations` - Metered generation (throttled)
/// - `POST /v1/billing/checkout` - Create a subscription checkout session
/// - `POST /v1/billing/portal` - Create a billing-portal session
///
/// ## Webhooks (signature verification, no concurrency cap)
/// - `POST /webhooks/billing` - Billing-processor events
/// - `POST /webhooks/identity` - Identity-provider lifecycle events
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let state = Arc::new(state);

    let api_routes = Router::new()
        .route("/credits/balance", get(credits::get_balance))
        .route("/usage", get(credits::list_usage))
        .route("/generations", post(generations::create_generation))
        .route("/billing/checkout", post(checkout::create_checkout))
        .route("/billing/portal", post(checkout::create_portal))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks skip the concurrency cap - delivery pacing is the
        // sender's concern and a rejected delivery just redelivers.
        .route("/webhooks/billing", post(webhooks::billing_webhook))
        .route("/webhooks/identity", post(webhooks::identity_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
