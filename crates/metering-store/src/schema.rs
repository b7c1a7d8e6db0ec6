//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Index: `subscription_ref` -> `account_id`. Value is the raw account id
    /// bytes.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Billing-event processing records for idempotency, keyed by `event_id`.
    pub const BILLING_EVENTS: &str = "billing_events";

    /// Outstanding credit reservations, keyed by `reservation_id` (ULID).
    pub const RESERVATIONS: &str = "reservations";

    /// Finalized usage records, keyed by
    /// `len(account_id) || account_id || reservation_id`.
    /// Since ULIDs are time-ordered, records for an account sort by time.
    pub const USAGE_RECORDS: &str = "usage_records";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::SUBSCRIPTIONS,
        cf::BILLING_EVENTS,
        cf::RESERVATIONS,
        cf::USAGE_RECORDS,
    ]
}
