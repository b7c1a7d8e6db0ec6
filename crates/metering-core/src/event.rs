//! Billing events and their append-only processing records.
//!
//! A [`BillingEvent`] is the engine's typed view of a processor notification
//! after signature verification and payload parsing. The external `event_id`
//! is the idempotency key: the store writes one [`BillingEventRecord`] per
//! processed id, and a record with `applied = true` short-circuits all
//! reprocessing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// A parsed billing notification from the payment processor.
///
/// Delivery is at-least-once and unordered; every variant must therefore be
/// safe to apply out of order and exactly-once-guarded by `event_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// A checkout session finished and a subscription was created.
    CheckoutCompleted {
        /// External idempotency key.
        event_id: String,
        /// The account that paid, carried in the session metadata.
        account_id: AccountId,
        /// Processor customer reference for this account.
        subject: String,
        /// Processor subscription reference.
        subscription_ref: String,
        /// Processor price identifier, resolved via the plan table.
        price_id: String,
        /// End of the first billing period, if the processor supplied one.
        period_end: Option<DateTime<Utc>>,
    },

    /// Subscription attributes changed mid-cycle (plan, status, period).
    SubscriptionUpdated {
        /// External idempotency key.
        event_id: String,
        /// Processor subscription reference.
        subscription_ref: String,
        /// Processor price identifier.
        price_id: String,
        /// End of the current billing period.
        period_end: Option<DateTime<Utc>>,
        /// Processor-reported status string (mapped leniently).
        status: String,
    },

    /// A renewal invoice was paid; the only transition that restores credits.
    InvoicePaid {
        /// External idempotency key.
        event_id: String,
        /// Processor subscription reference.
        subscription_ref: String,
        /// Processor price identifier.
        price_id: String,
        /// End of the new billing period.
        period_end: Option<DateTime<Utc>>,
    },

    /// A renewal invoice failed; the account enters the grace period.
    InvoicePaymentFailed {
        /// External idempotency key.
        event_id: String,
        /// Processor subscription reference.
        subscription_ref: String,
    },

    /// The subscription ended; the account reverts to the free tier.
    SubscriptionDeleted {
        /// External idempotency key.
        event_id: String,
        /// Processor subscription reference.
        subscription_ref: String,
    },
}

impl BillingEvent {
    /// The external idempotency key for this event.
    #[must_use]
    pub fn event_id(&self) -> &str {
        match self {
            Self::CheckoutCompleted { event_id, .. }
            | Self::SubscriptionUpdated { event_id, .. }
            | Self::InvoicePaid { event_id, .. }
            | Self::InvoicePaymentFailed { event_id, .. }
            | Self::SubscriptionDeleted { event_id, .. } => event_id,
        }
    }

    /// Canonical event-type name, recorded in the event history.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::CheckoutCompleted { .. } => "checkout_completed",
            Self::SubscriptionUpdated { .. } => "subscription_updated",
            Self::InvoicePaid { .. } => "invoice_paid",
            Self::InvoicePaymentFailed { .. } => "invoice_payment_failed",
            Self::SubscriptionDeleted { .. } => "subscription_deleted",
        }
    }

    /// The subscription reference this event targets, if it carries one.
    ///
    /// `checkout_completed` resolves its account through the session metadata
    /// instead, so it returns `None` here.
    #[must_use]
    pub fn subscription_ref(&self) -> Option<&str> {
        match self {
            Self::CheckoutCompleted { .. } => None,
            Self::SubscriptionUpdated {
                subscription_ref, ..
            }
            | Self::InvoicePaid {
                subscription_ref, ..
            }
            | Self::InvoicePaymentFailed {
                subscription_ref, ..
            }
            | Self::SubscriptionDeleted {
                subscription_ref, ..
            } => Some(subscription_ref),
        }
    }
}

/// Append-only record of a processed billing event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingEventRecord {
    /// External event identifier (the idempotency key).
    pub event_id: String,

    /// Canonical event type name.
    pub event_type: String,

    /// When the engine first saw the event.
    pub received_at: DateTime<Utc>,

    /// Whether the event's side effects were applied.
    ///
    /// `false` means the event was seen but dropped (unknown reference,
    /// unknown price tier, rejected duplicate subscription). The record is
    /// the idempotency marker either way: a redelivery of a dropped event is
    /// acknowledged as a duplicate without re-evaluation.
    pub applied: bool,
}

impl BillingEventRecord {
    /// Record an applied event.
    #[must_use]
    pub fn applied(event: &BillingEvent) -> Self {
        Self {
            event_id: event.event_id().to_string(),
            event_type: event.event_type().to_string(),
            received_at: Utc::now(),
            applied: true,
        }
    }

    /// Record a dropped event.
    #[must_use]
    pub fn dropped(event: &BillingEvent) -> Self {
        Self {
            applied: false,
            ..Self::applied(event)
        }
    }
}
