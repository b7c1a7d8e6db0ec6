//! Authentication extractor.
//!
//! End-user routes authenticate with a Bearer JWT signed HS256 by the
//! identity provider using the shared secret from configuration. The subject
//! claim is the account id.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use metering_core::AccountId;

use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated caller extracted from a Bearer JWT.
#[derive(Debug, Clone)]
pub struct AuthAccount {
    /// The account id (JWT subject).
    pub account_id: AccountId,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (account id).
    pub sub: String,
    /// Audience.
    #[serde(default)]
    pub aud: Option<String>,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default)]
    pub iat: i64,
}

impl FromRequestParts<Arc<AppState>> for AuthAccount {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let auth_header = parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .ok_or(ApiError::Unauthorized)?;

            let token = auth_header
                .strip_prefix("Bearer ")
                .ok_or(ApiError::Unauthorized)?;

            let mut validation = Validation::new(Algorithm::HS256);
            validation.set_audience(&[&state.config.auth_audience]);

            let key = DecodingKey::from_secret(state.config.auth_jwt_secret.as_bytes());
            let token_data = decode::<JwtClaims>(token, &key, &validation).map_err(|e| {
                tracing::debug!(error = %e, "JWT validation failed");
                ApiError::Unauthorized
            })?;

            let account_id = token_data
                .claims
                .sub
                .parse::<AccountId>()
                .map_err(|_| ApiError::Unauthorized)?;

            Ok(AuthAccount { account_id })
        })
    }
}
