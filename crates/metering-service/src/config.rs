//! Service configuration.

use metering_core::{CoreError, Plan, PlanTable};

/// Default per-route limit for metered generation requests.
pub const DEFAULT_RATE_MAX_REQUESTS: u32 = 10;

/// Default fixed-window duration in seconds.
pub const DEFAULT_RATE_WINDOW_SECONDS: u64 = 60;

/// Default per-account daily cap on image synthesis.
pub const DEFAULT_DAILY_IMAGE_CAP: u64 = 50;

/// Default age in seconds after which an unfinalized reservation is refunded.
///
/// Must exceed the request timeout so the sweep never races a request that
/// is still in flight.
pub const DEFAULT_RESERVATION_TIMEOUT_SECONDS: u64 = 300;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/metering").
    pub data_dir: String,

    /// Shared secret for HS256 JWT validation.
    pub auth_jwt_secret: String,

    /// Expected JWT audience (default: "metering").
    pub auth_audience: String,

    /// Identity-provider webhook signing secret (optional).
    pub identity_webhook_secret: Option<String>,

    /// Billing-processor webhook signing secret (optional).
    pub billing_webhook_secret: Option<String>,

    /// Billing-processor API key (optional; checkout/portal disabled without).
    pub billing_api_key: Option<String>,

    /// Billing-processor API base URL.
    pub billing_api_url: String,

    /// Processor price id for the standard tier.
    pub price_standard_id: String,

    /// Processor price id for the premium tier.
    pub price_premium_id: String,

    /// Text-generation provider URL.
    pub text_provider_url: String,

    /// Image-synthesis provider URL.
    pub image_provider_url: String,

    /// Credit cost of one text generation.
    pub text_cost: i64,

    /// Credit cost of one image synthesis.
    pub image_cost: i64,

    /// Frontend URL for checkout redirects.
    pub frontend_url: String,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Fixed-window limit for generation requests per caller.
    pub rate_max_requests: u32,

    /// Fixed-window duration in seconds.
    pub rate_window_seconds: u64,

    /// Per-account daily cap on image synthesis attempts.
    pub daily_image_cap: u64,

    /// Unfinalized reservations older than this are refunded by the sweep.
    pub reservation_timeout_seconds: u64,

    /// How often the reservation sweep runs.
    pub sweep_interval_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `AUTH_JWT_SECRET` is unset or the price ids are
    /// missing or collide.
    pub fn from_env() -> Result<Self, CoreError> {
        let auth_jwt_secret = std::env::var("AUTH_JWT_SECRET")
            .map_err(|_| CoreError::Configuration("AUTH_JWT_SECRET is required".into()))?;

        let price_standard_id = std::env::var("PRICE_STANDARD_ID")
            .map_err(|_| CoreError::Configuration("PRICE_STANDARD_ID is required".into()))?;
        let price_premium_id = std::env::var("PRICE_PREMIUM_ID")
            .map_err(|_| CoreError::Configuration("PRICE_PREMIUM_ID is required".into()))?;

        let config = Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/metering".into()),
            auth_jwt_secret,
            auth_audience: std::env::var("AUTH_AUDIENCE").unwrap_or_else(|_| "metering".into()),
            identity_webhook_secret: std::env::var("IDENTITY_WEBHOOK_SECRET").ok(),
            billing_webhook_secret: std::env::var("BILLING_WEBHOOK_SECRET").ok(),
            billing_api_key: std::env::var("BILLING_API_KEY").ok(),
            billing_api_url: std::env::var("BILLING_API_URL")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".into()),
            price_standard_id,
            price_premium_id,
            text_provider_url: std::env::var("TEXT_PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:9001/generate".into()),
            image_provider_url: std::env::var("IMAGE_PROVIDER_URL")
                .unwrap_or_else(|_| "http://localhost:9002/synthesize".into()),
            text_cost: env_parsed("TEXT_COST", 1),
            image_cost: env_parsed("IMAGE_COST", 1),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parsed("MAX_BODY_BYTES", 1024 * 1024),
            request_timeout_seconds: env_parsed("REQUEST_TIMEOUT_SECONDS", 30),
            rate_max_requests: env_parsed("RATE_MAX_REQUESTS", DEFAULT_RATE_MAX_REQUESTS),
            rate_window_seconds: env_parsed("RATE_WINDOW_SECONDS", DEFAULT_RATE_WINDOW_SECONDS),
            daily_image_cap: env_parsed("DAILY_IMAGE_CAP", DEFAULT_DAILY_IMAGE_CAP),
            reservation_timeout_seconds: env_parsed(
                "RESERVATION_TIMEOUT_SECONDS",
                DEFAULT_RESERVATION_TIMEOUT_SECONDS,
            ),
            sweep_interval_seconds: env_parsed("SWEEP_INTERVAL_SECONDS", 60),
        };

        // Fail fast on a bad plan mapping rather than dropping events later.
        config.plan_table()?;

        Ok(config)
    }

    /// Build the price-id to plan mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured price ids are blank or identical.
    pub fn plan_table(&self) -> Result<PlanTable, CoreError> {
        PlanTable::new([
            (self.price_standard_id.clone(), Plan::Standard),
            (self.price_premium_id.clone(), Plan::Premium),
        ])
    }

    /// Credit cost of one operation of the given kind.
    #[must_use]
    pub fn cost_of(&self, kind: metering_core::OperationKind) -> i64 {
        match kind {
            metering_core::OperationKind::TextGeneration => self.text_cost,
            metering_core::OperationKind::ImageSynthesis => self.image_cost,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Development defaults; production deployments load from the environment.
impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: "/tmp/metering".into(),
            auth_jwt_secret: "dev-secret".into(),
            auth_audience: "metering".into(),
            identity_webhook_secret: None,
            billing_webhook_secret: None,
            billing_api_key: None,
            billing_api_url: "https://api.stripe.com/v1".into(),
            price_standard_id: "price_standard".into(),
            price_premium_id: "price_premium".into(),
            text_provider_url: "http://localhost:9001/generate".into(),
            image_provider_url: "http://localhost:9002/synthesize".into(),
            text_cost: 1,
            image_cost: 1,
            frontend_url: "http://localhost:3000".into(),
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            rate_max_requests: DEFAULT_RATE_MAX_REQUESTS,
            rate_window_seconds: DEFAULT_RATE_WINDOW_SECONDS,
            daily_image_cap: DEFAULT_DAILY_IMAGE_CAP,
            reservation_timeout_seconds: DEFAULT_RESERVATION_TIMEOUT_SECONDS,
            sweep_interval_seconds: 60,
        }
    }
}
