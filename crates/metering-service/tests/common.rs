//! Common test utilities for metering integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use tempfile::TempDir;

use metering_core::AccountId;
use metering_service::auth::JwtClaims;
use metering_service::crypto::hmac_sha256_hex;
use metering_service::{create_router, AppState, ServiceConfig};
use metering_store::RocksStore;

/// Shared secret the harness signs JWTs with.
pub const JWT_SECRET: &str = "test-jwt-secret";

/// Billing webhook signing secret.
pub const BILLING_SECRET: &str = "whsec_test";

/// Identity webhook signing secret.
pub const IDENTITY_SECRET: &str = "idsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// Direct store access for seeding and asserting.
    pub store: Arc<RocksStore>,
    /// A test account for authenticated requests.
    pub account_id: AccountId,
}

impl TestHarness {
    /// Create a harness with the default test configuration.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness, letting the test tweak the configuration first.
    pub fn with_config(configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let mut config = ServiceConfig {
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            auth_jwt_secret: JWT_SECRET.into(),
            billing_webhook_secret: Some(BILLING_SECRET.into()),
            identity_webhook_secret: Some(IDENTITY_SECRET.into()),
            ..ServiceConfig::default()
        };
        configure(&mut config);

        let state =
            AppState::new(Arc::clone(&store) as Arc<dyn metering_store::Store>, config)
                .expect("Failed to build app state");
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");
        let account_id = AccountId::generate();

        Self {
            server,
            _temp_dir: temp_dir,
            store,
            account_id,
        }
    }

    /// Mint a Bearer token for the harness account.
    pub fn auth_header(&self) -> String {
        Self::auth_header_for(&self.account_id)
    }

    /// Mint a Bearer token for an arbitrary account.
    pub fn auth_header_for(account_id: &AccountId) -> String {
        let claims = JwtClaims {
            sub: account_id.to_string(),
            aud: Some("metering".into()),
            exp: Utc::now().timestamp() + 3600,
            iat: Utc::now().timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("Failed to sign test token");
        format!("Bearer {token}")
    }

    /// Sign a billing webhook body the way the processor does.
    pub fn billing_signature(body: &str) -> String {
        let timestamp = Utc::now().timestamp();
        let signature = hmac_sha256_hex(BILLING_SECRET, &format!("{timestamp}.{body}"));
        format!("t={timestamp},v1={signature}")
    }

    /// Sign an identity webhook body.
    pub fn identity_signature(body: &str) -> String {
        hmac_sha256_hex(IDENTITY_SECRET, body)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
