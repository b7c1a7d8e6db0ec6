//! Billing-processor webhook payload types.
//!
//! The processor posts a JSON envelope `{id, type, data: {object}}`. Only
//! the fields the state machine needs are modeled; everything else in the
//! objects is ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use metering_core::{AccountId, BillingEvent};

/// Webhook envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    /// Processor event id (idempotency key).
    pub id: String,
    /// Event type, e.g. `checkout.session.completed`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookData,
}

/// Event data container.
#[derive(Debug, Deserialize)]
pub struct WebhookData {
    /// The object the event describes.
    pub object: serde_json::Value,
}

/// Checkout session object (the fields we read).
#[derive(Debug, Deserialize)]
struct CheckoutSession {
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    metadata: SessionMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct SessionMetadata {
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    price_id: Option<String>,
}

/// Subscription object.
#[derive(Debug, Deserialize)]
struct Subscription {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    items: SubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionItem {
    price: PriceRef,
}

#[derive(Debug, Deserialize)]
struct PriceRef {
    id: String,
}

/// Invoice object.
#[derive(Debug, Deserialize)]
struct Invoice {
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    lines: InvoiceLines,
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceLines {
    #[serde(default)]
    data: Vec<InvoiceLine>,
}

#[derive(Debug, Deserialize)]
struct InvoiceLine {
    #[serde(default)]
    price: Option<PriceRef>,
    #[serde(default)]
    period: Option<InvoicePeriod>,
}

#[derive(Debug, Deserialize)]
struct InvoicePeriod {
    #[serde(default)]
    end: Option<i64>,
}

/// Error parsing a recognized event type.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The object shape did not match the event type.
    #[error("malformed {event_type} object: {source}")]
    Malformed {
        /// The envelope's event type.
        event_type: String,
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// A recognized event is missing a field the state machine needs.
    #[error("{event_type} missing required field {field}")]
    MissingField {
        /// The envelope's event type.
        event_type: String,
        /// The absent field.
        field: &'static str,
    },
}

impl WebhookEnvelope {
    /// Map the envelope onto a [`BillingEvent`].
    ///
    /// Returns `Ok(None)` for event types the engine does not handle; the
    /// handler acknowledges those so the processor stops redelivering.
    ///
    /// # Errors
    ///
    /// Returns an error when a recognized event type carries an object the
    /// state machine cannot use.
    pub fn to_billing_event(&self) -> Result<Option<BillingEvent>, ParseError> {
        let event = match self.event_type.as_str() {
            "checkout.session.completed" => {
                let session: CheckoutSession = self.parse_object()?;
                let account_id = session
                    .metadata
                    .account_id
                    .or(session.client_reference_id)
                    .ok_or_else(|| self.missing("client_reference_id"))?
                    .parse::<AccountId>()
                    .map_err(|_| self.missing("client_reference_id"))?;

                BillingEvent::CheckoutCompleted {
                    event_id: self.id.clone(),
                    account_id,
                    subject: session
                        .customer
                        .ok_or_else(|| self.missing("customer"))?,
                    subscription_ref: session
                        .subscription
                        .ok_or_else(|| self.missing("subscription"))?,
                    price_id: session
                        .metadata
                        .price_id
                        .ok_or_else(|| self.missing("metadata.price_id"))?,
                    period_end: None,
                }
            }
            "customer.subscription.updated" => {
                let sub: Subscription = self.parse_object()?;
                let price_id = sub
                    .items
                    .data
                    .first()
                    .map(|item| item.price.id.clone())
                    .ok_or_else(|| self.missing("items.data[0].price"))?;

                BillingEvent::SubscriptionUpdated {
                    event_id: self.id.clone(),
                    subscription_ref: sub.id,
                    price_id,
                    period_end: sub.current_period_end.and_then(unix_seconds),
                    status: sub.status.unwrap_or_default(),
                }
            }
            "invoice.payment_succeeded" => {
                let invoice: Invoice = self.parse_object()?;
                let line = invoice.lines.data.first();

                BillingEvent::InvoicePaid {
                    event_id: self.id.clone(),
                    subscription_ref: invoice
                        .subscription
                        .ok_or_else(|| self.missing("subscription"))?,
                    price_id: line
                        .and_then(|l| l.price.as_ref())
                        .map(|p| p.id.clone())
                        .ok_or_else(|| self.missing("lines.data[0].price"))?,
                    period_end: line
                        .and_then(|l| l.period.as_ref())
                        .and_then(|p| p.end)
                        .and_then(unix_seconds),
                }
            }
            "invoice.payment_failed" => {
                let invoice: Invoice = self.parse_object()?;

                BillingEvent::InvoicePaymentFailed {
                    event_id: self.id.clone(),
                    subscription_ref: invoice
                        .subscription
                        .ok_or_else(|| self.missing("subscription"))?,
                }
            }
            "customer.subscription.deleted" => {
                let sub: Subscription = self.parse_object()?;

                BillingEvent::SubscriptionDeleted {
                    event_id: self.id.clone(),
                    subscription_ref: sub.id,
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    fn parse_object<T: serde::de::DeserializeOwned>(&self) -> Result<T, ParseError> {
        serde_json::from_value(self.data.object.clone()).map_err(|source| ParseError::Malformed {
            event_type: self.event_type.clone(),
            source,
        })
    }

    fn missing(&self, field: &'static str) -> ParseError {
        ParseError::MissingField {
            event_type: self.event_type.clone(),
            field,
        }
    }
}

fn unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
