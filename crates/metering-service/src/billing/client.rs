//! Billing-processor REST client.
//!
//! Creates checkout and billing-portal sessions. Webhook verification lives
//! in [`crate::crypto`]; this client only makes outbound calls.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

/// Error type for billing-processor operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor API returned an error.
    #[error("billing API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the processor.
        message: String,
    },
}

/// A created checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session id.
    pub id: String,
    /// URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
}

/// A created billing-portal session.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalSession {
    /// URL to redirect the user to.
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Billing-processor API client.
#[derive(Debug, Clone)]
pub struct BillingClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl BillingClient {
    /// Create a client against the given API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BillingError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Create a subscription checkout session for an account and price.
    ///
    /// The account id rides along as `client_reference_id` and in the
    /// session metadata so the completion webhook can attribute the
    /// subscription without a lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the processor rejects it.
    pub async fn create_subscription_checkout(
        &self,
        account_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, BillingError> {
        let mut form = HashMap::new();
        form.insert("mode", "subscription");
        form.insert("client_reference_id", account_id);
        form.insert("line_items[0][price]", price_id);
        form.insert("line_items[0][quantity]", "1");
        form.insert("success_url", success_url);
        form.insert("cancel_url", cancel_url);
        form.insert("metadata[account_id]", account_id);
        form.insert("metadata[price_id]", price_id);

        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    /// Create a billing-portal session for an existing billing subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the processor rejects it.
    pub async fn create_portal_session(
        &self,
        billing_subject_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, BillingError> {
        let mut form = HashMap::new();
        form.insert("customer", billing_subject_id);
        form.insert("return_url", return_url);

        let response = self
            .client
            .post(format!("{}/billing_portal/sessions", self.base_url))
            .basic_auth(&self.api_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        Self::handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BillingError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<ApiErrorBody>().await {
            Ok(body) => body.error.message.unwrap_or_else(|| "unknown".to_string()),
            Err(_) => "unknown".to_string(),
        };

        Err(BillingError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
