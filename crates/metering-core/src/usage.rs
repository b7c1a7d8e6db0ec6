//! Reservations and the usage audit trail.
//!
//! Every paid operation follows reserve-then-call-then-commit/refund: the
//! store decrements the balance and persists a [`Reservation`] in one atomic
//! write, the provider call runs, and finalization replaces the reservation
//! with a [`UsageRecord`] carrying the outcome. A reservation that is never
//! finalized (crash, abandoned request) is refunded by the sweep once it is
//! older than the configured timeout.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ReservationId};

/// The kind of paid operation being metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Text generation (post copy, captions).
    TextGeneration,

    /// Image synthesis; the costly kind guarded by the daily soft cap.
    ImageSynthesis,
}

impl OperationKind {
    /// Kind name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TextGeneration => "text_generation",
            Self::ImageSynthesis => "image_synthesis",
        }
    }
}

/// A pending, atomically-decremented claim on the credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier; becomes the usage-record id on finalization.
    pub id: ReservationId,

    /// The account whose balance was decremented.
    pub account_id: AccountId,

    /// What the credits were reserved for.
    pub operation_kind: OperationKind,

    /// Credits decremented; re-incremented (capped) on refund.
    pub cost_credits: i64,

    /// When the reservation was taken; the sweep refunds reservations older
    /// than the timeout.
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a new reservation for an account.
    #[must_use]
    pub fn new(account_id: AccountId, operation_kind: OperationKind, cost_credits: i64) -> Self {
        Self {
            id: ReservationId::generate(),
            account_id,
            operation_kind,
            cost_credits,
            created_at: Utc::now(),
        }
    }
}

/// Final outcome of a consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    /// The downstream call succeeded; the decrement stands.
    Committed,

    /// The downstream call failed or timed out; the decrement was reversed.
    Refunded,
}

/// One row per consumption attempt, kept for auditing and the daily soft
/// quota (counted by `created_at` within the current UTC day, regardless of
/// outcome or credit cost).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record identifier (the originating reservation id).
    pub id: ReservationId,

    /// The account that consumed.
    pub account_id: AccountId,

    /// What was consumed.
    pub operation_kind: OperationKind,

    /// Credits charged for the attempt.
    pub cost_credits: i64,

    /// Whether the charge stood or was refunded.
    pub outcome: UsageOutcome,

    /// When the attempt started (reservation time, not finalization time).
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Build the audit record for a finalized reservation.
    #[must_use]
    pub fn from_reservation(reservation: &Reservation, outcome: UsageOutcome) -> Self {
        Self {
            id: reservation.id,
            account_id: reservation.account_id.clone(),
            operation_kind: reservation.operation_kind,
            cost_credits: reservation.cost_credits,
            outcome,
            created_at: reservation.created_at,
        }
    }
}
