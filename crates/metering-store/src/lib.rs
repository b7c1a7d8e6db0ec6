//! Ledger storage for the metering engine.
//!
//! This crate persists accounts, the append-only billing-event history,
//! reservations, and the usage audit trail in `RocksDB` with column families.
//!
//! # Architecture
//!
//! - `accounts`: account rows, keyed by `account_id`
//! - `subscriptions`: index `subscription_ref -> account_id`
//! - `billing_events`: idempotency records, keyed by external `event_id`
//! - `reservations`: outstanding credit reservations, keyed by ULID
//! - `usage_records`: finalized consumption attempts, keyed by
//!   `account_id || reservation_id` so they sort chronologically per account
//!
//! # Atomicity
//!
//! Every compound read-modify-write (reserve, finalize, billing-event
//! application) runs under the store's internal write lock and commits with a
//! single `WriteBatch`, so a balance check and its decrement can never
//! interleave with another writer, and an idempotency check lands in the same
//! unit as the transition it guards.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use metering_core::{
    Account, AccountId, BillingEvent, BillingEventRecord, DropReason, OperationKind, PlanTable,
    Reservation, UsageRecord,
};

/// Outcome of applying one billing event through the store.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    /// The transition was applied; carries the new account row.
    Applied(Account),

    /// The event id was already applied; nothing happened.
    Duplicate,

    /// The transition dropped the event; recorded as `applied = false`.
    Dropped(DropReason),
}

/// The storage trait defining all ledger operations.
///
/// Implementations must make each method atomic on its own: callers never
/// hold locks across calls.
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Insert or overwrite an account row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Insert an account only if no row exists for its id.
    ///
    /// Returns `true` if the row was created. Used by the identity webhook
    /// and lazy creation so a redelivered `account.created` never resets an
    /// existing balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_account_if_absent(&self, account: &Account) -> Result<bool>;

    /// Get an account by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Delete an account row (explicit account-deletion event only).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn delete_account(&self, account_id: &AccountId) -> Result<()>;

    /// Resolve an account through the subscription-reference index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_account_by_subscription(&self, subscription_ref: &str) -> Result<Option<Account>>;

    // =========================================================================
    // Billing Events (state machine + idempotency)
    // =========================================================================

    /// Get the processing record for an event id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_billing_event(&self, event_id: &str) -> Result<Option<BillingEventRecord>>;

    /// Apply a billing event atomically.
    ///
    /// Checks the idempotency record, resolves the target account, runs the
    /// subscription state machine, and writes the new account row, updated
    /// subscription index, and event record in one batch. Dropped events are
    /// recorded but never error: the processor redelivers on error responses.
    ///
    /// # Errors
    ///
    /// Returns an error only for store failures; in that case no partial
    /// mutation is visible and the caller may let the processor redeliver.
    fn apply_billing_event(&self, event: &BillingEvent, plans: &PlanTable) -> Result<EventOutcome>;

    // =========================================================================
    // Credit Reservations
    // =========================================================================

    /// Atomically check and decrement the balance, persisting a reservation.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidCost` if `cost < 1`.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientCredits` if the balance is short; no write
    ///   is performed.
    fn reserve_credits(
        &self,
        account_id: &AccountId,
        operation_kind: OperationKind,
        cost: i64,
    ) -> Result<Reservation>;

    /// Finalize a reservation as committed (balance already decremented).
    ///
    /// Idempotent: a reservation that was already finalized is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn commit_reservation(&self, reservation: &Reservation) -> Result<()>;

    /// Finalize a reservation as refunded, re-incrementing the balance
    /// capped at the account's current `credits_total`.
    ///
    /// Returns the balance after the refund. Idempotent: a reservation that
    /// was already finalized is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn refund_reservation(&self, reservation: &Reservation) -> Result<i64>;

    /// Refund every outstanding reservation created before `cutoff`.
    ///
    /// Returns the number of reservations refunded. Run periodically so an
    /// abandoned request can never strand a decrement.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn sweep_stale_reservations(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // =========================================================================
    // Usage Audit Trail
    // =========================================================================

    /// Count usage records for `(account, kind)` created at or after `since`.
    ///
    /// Counts every attempt regardless of outcome; this feeds the daily soft
    /// quota.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_usage_since(
        &self,
        account_id: &AccountId,
        operation_kind: OperationKind,
        since: DateTime<Utc>,
    ) -> Result<u64>;

    /// List usage records for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_usage(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>>;
}
