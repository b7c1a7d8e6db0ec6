//! Application state.

use std::sync::Arc;
use std::time::Duration;

use metering_core::{CoreError, PlanTable};
use metering_store::Store;

use crate::billing::BillingClient;
use crate::config::ServiceConfig;
use crate::guard::CreditGuard;
use crate::providers::{GenerationProvider, HttpGenerationProvider};
use crate::throttle::{FixedWindowLimiter, RateLimiter};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Price-id to plan mapping.
    pub plans: PlanTable,

    /// Credit consumption guard.
    pub guard: CreditGuard,

    /// Fixed-window rate limiter for generation requests.
    pub limiter: Arc<dyn RateLimiter>,

    /// Downstream generation provider.
    pub provider: Arc<dyn GenerationProvider>,

    /// Billing-processor client (optional; checkout and portal return 502
    /// when absent).
    pub billing: Option<Arc<BillingClient>>,
}

impl AppState {
    /// Create application state with the default limiter and HTTP provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan table is invalid or the provider client
    /// cannot be built.
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, CoreError> {
        let limiter: Arc<dyn RateLimiter> = Arc::new(FixedWindowLimiter::new(
            config.rate_max_requests,
            Duration::from_secs(config.rate_window_seconds),
        ));

        let provider: Arc<dyn GenerationProvider> = Arc::new(
            HttpGenerationProvider::new(
                config.text_provider_url.clone(),
                config.image_provider_url.clone(),
                Duration::from_secs(config.request_timeout_seconds),
            )
            .map_err(|e| CoreError::Configuration(e.to_string()))?,
        );

        Self::with_parts(store, config, limiter, provider)
    }

    /// Create application state with injected throttle and provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured plan table is invalid.
    pub fn with_parts(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        limiter: Arc<dyn RateLimiter>,
        provider: Arc<dyn GenerationProvider>,
    ) -> Result<Self, CoreError> {
        let plans = config.plan_table()?;

        let billing = config.billing_api_key.as_ref().and_then(|key| {
            match BillingClient::new(&config.billing_api_url, key) {
                Ok(client) => {
                    tracing::info!("billing processor integration enabled");
                    Some(Arc::new(client))
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to create billing client");
                    None
                }
            }
        });

        if billing.is_none() {
            tracing::warn!("billing processor not configured - checkout and portal are disabled");
        }
        if config.billing_webhook_secret.is_none() {
            tracing::warn!("billing webhook secret not configured - billing events are rejected");
        }
        if config.identity_webhook_secret.is_none() {
            tracing::warn!("identity webhook secret not configured - identity events are rejected");
        }

        let guard = CreditGuard::new(Arc::clone(&store));

        Ok(Self {
            store,
            config,
            plans,
            guard,
            limiter,
            provider,
            billing,
        })
    }
}
