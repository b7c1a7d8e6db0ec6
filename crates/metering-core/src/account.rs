//! Account types for the metering engine.
//!
//! One `Account` row exists per end user. The subscription state machine is
//! the only writer of the plan/status/allotment fields; the consumption guard
//! only ever touches `credits_remaining`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

// ============================================================================
// Constants
// ============================================================================

/// Starter credit pool granted to every new free-tier account.
///
/// This is a one-time pool, not a monthly allowance: the free plan never
/// receives a renewal event, so its balance only ever decreases.
pub const FREE_PLAN_CREDITS: i64 = 10;

/// Standard plan monthly credit allotment.
pub const STANDARD_PLAN_CREDITS: i64 = 100;

/// Premium plan monthly credit allotment.
pub const PREMIUM_PLAN_CREDITS: i64 = 500;

/// The ledgered account row.
///
/// Invariant: `0 <= credits_remaining <= credits_total`. Constructors and
/// every transition in [`crate::subscription`] preserve it; the store's
/// reserve/refund operations preserve it under concurrency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Stable external identity key, unique per account.
    pub account_id: AccountId,

    /// Current subscription plan.
    pub plan: Plan,

    /// Current subscription status.
    pub subscription_status: SubscriptionStatus,

    /// Credit allotment for the current cycle.
    pub credits_total: i64,

    /// Credits still available for consumption this cycle.
    pub credits_remaining: i64,

    /// When the next renewal is expected; `None` on the free tier.
    pub credits_reset_at: Option<DateTime<Utc>>,

    /// Opaque reference to this account's record in the payment processor.
    /// `None` until the first checkout creates one.
    pub billing_subject_id: Option<String>,

    /// Opaque reference to the current subscription; `None` on the free plan.
    pub active_subscription_ref: Option<String>,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new free-tier account with the starter pool.
    #[must_use]
    pub fn new(account_id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            plan: Plan::Free,
            subscription_status: SubscriptionStatus::None,
            credits_total: FREE_PLAN_CREDITS,
            credits_remaining: FREE_PLAN_CREDITS,
            credits_reset_at: None,
            billing_subject_id: None,
            active_subscription_ref: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the account currently holds a paid, non-canceled subscription.
    ///
    /// A second paid checkout is rejected while this is true.
    #[must_use]
    pub fn has_active_subscription(&self) -> bool {
        self.plan != Plan::Free
            && matches!(
                self.subscription_status,
                SubscriptionStatus::Active | SubscriptionStatus::PastDue
            )
    }

    /// Whether the ledger invariant holds for this row.
    #[must_use]
    pub fn invariant_holds(&self) -> bool {
        0 <= self.credits_remaining && self.credits_remaining <= self.credits_total
    }
}

/// Available subscription plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// Free tier: one-time starter pool, no renewal.
    Free,

    /// Standard plan: monthly allotment, renewed on `invoice_paid`.
    Standard,

    /// Premium plan: larger monthly allotment, renewed on `invoice_paid`.
    Premium,
}

impl Plan {
    /// Credit allotment granted for this plan.
    #[must_use]
    pub const fn allotment(self) -> i64 {
        match self {
            Self::Free => FREE_PLAN_CREDITS,
            Self::Standard => STANDARD_PLAN_CREDITS,
            Self::Premium => PREMIUM_PLAN_CREDITS,
        }
    }

    /// Plan name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

/// Status of the account's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Never subscribed.
    None,

    /// Subscription is active and paid up.
    Active,

    /// A renewal invoice failed; grace period, consumption still allowed.
    PastDue,

    /// Subscription ended; account is back on the free plan.
    Canceled,
}

impl SubscriptionStatus {
    /// Status name as used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// Map a processor-reported status string to the engine's status.
    ///
    /// Unknown strings map to `None` returned as `Option::None` so callers
    /// can keep the current status rather than guessing.
    #[must_use]
    pub fn from_processor(status: &str) -> Option<Self> {
        match status {
            "active" | "trialing" => Some(Self::Active),
            "past_due" | "unpaid" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }
}
