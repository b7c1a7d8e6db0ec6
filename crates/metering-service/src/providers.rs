//! Generation providers.
//!
//! The engine treats providers as opaque request/response functions: each
//! call has a credit cost and either succeeds with an output or fails. The
//! trait keeps handlers testable without a live provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use metering_core::OperationKind;

/// Error type for provider calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure or timeout.
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        message: String,
    },
}

/// A downstream generation provider.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Run one generation and return its output.
    async fn generate(&self, kind: OperationKind, input: &str) -> Result<String, ProviderError>;
}

#[derive(Serialize)]
struct ProviderRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct ProviderResponse {
    output: String,
}

/// Provider implementation over plain HTTP endpoints, one URL per kind.
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    text_url: String,
    image_url: String,
}

impl HttpGenerationProvider {
    /// Create a provider with per-kind endpoint URLs.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        text_url: String,
        image_url: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            text_url,
            image_url,
        })
    }

    fn url_for(&self, kind: OperationKind) -> &str {
        match kind {
            OperationKind::TextGeneration => &self.text_url,
            OperationKind::ImageSynthesis => &self.image_url,
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, kind: OperationKind, input: &str) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.url_for(kind))
            .json(&ProviderRequest { input })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message: String = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: ProviderResponse = response.json().await?;
        Ok(body.output)
    }
}
