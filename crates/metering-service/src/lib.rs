//! Metering HTTP API service.
//!
//! This crate exposes the metering engine over HTTP:
//!
//! - Credit balance and usage history
//! - Metered generation requests (reserve / provider call / commit or refund)
//! - Checkout and billing-portal session creation
//! - Billing and identity webhooks
//!
//! # Authentication
//!
//! End-user routes take a Bearer JWT (HS256, shared secret). Webhook routes
//! are authenticated by signature instead: the billing processor signs with
//! a timestamped `t=...,v1=...` scheme, the identity provider with a plain
//! HMAC-SHA256 hex digest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for consistency

pub mod auth;
pub mod billing;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod providers;
pub mod routes;
pub mod state;
pub mod throttle;

pub use billing::{BillingClient, BillingError};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use guard::CreditGuard;
pub use providers::{GenerationProvider, HttpGenerationProvider, ProviderError};
pub use routes::create_router;
pub use state::AppState;
pub use throttle::{FixedWindowLimiter, RateDecision, RateLimiter};
