//! Key encoding utilities for `RocksDB`.
//!
//! Account ids are variable-length strings, so composite keys carry a
//! big-endian `u16` length prefix to keep prefixes unambiguous.

use chrono::{DateTime, Utc};
use metering_core::{AccountId, ReservationId};

/// Create an account key from an account ID.
#[must_use]
pub fn account_key(account_id: &AccountId) -> Vec<u8> {
    account_id.as_bytes().to_vec()
}

/// Create a subscription index key from an external subscription reference.
#[must_use]
pub fn subscription_key(subscription_ref: &str) -> Vec<u8> {
    subscription_ref.as_bytes().to_vec()
}

/// Create a billing event key from an external event ID.
#[must_use]
pub fn billing_event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Create a reservation key from a reservation ID.
#[must_use]
pub fn reservation_key(reservation_id: &ReservationId) -> Vec<u8> {
    reservation_id.to_bytes().to_vec()
}

/// Create a usage record key.
///
/// Format: `len(account_id) as u16 BE || account_id || reservation_id (16 bytes)`
///
/// Since ULIDs are time-ordered, records for an account will be sorted by
/// creation time.
#[must_use]
pub fn usage_record_key(account_id: &AccountId, reservation_id: &ReservationId) -> Vec<u8> {
    let id_bytes = account_id.as_bytes();
    let mut key = Vec::with_capacity(2 + id_bytes.len() + 16);
    key.extend_from_slice(&u16_len(id_bytes).to_be_bytes());
    key.extend_from_slice(id_bytes);
    key.extend_from_slice(&reservation_id.to_bytes());
    key
}

/// Create a prefix for iterating all usage records for an account.
#[must_use]
pub fn usage_records_prefix(account_id: &AccountId) -> Vec<u8> {
    let id_bytes = account_id.as_bytes();
    let mut prefix = Vec::with_capacity(2 + id_bytes.len());
    prefix.extend_from_slice(&u16_len(id_bytes).to_be_bytes());
    prefix.extend_from_slice(id_bytes);
    prefix
}

/// Smallest possible ULID key bytes for reservations created at `since`.
///
/// Appending this to a usage prefix gives the seek point for a forward
/// time-bounded scan.
#[must_use]
pub fn reservation_lower_bound(since: DateTime<Utc>) -> [u8; 16] {
    let millis = u64::try_from(since.timestamp_millis()).unwrap_or(0);
    ReservationId::lower_bound(millis).to_bytes()
}

fn u16_len(bytes: &[u8]) -> u16 {
    // AccountId parsing caps the id at 128 bytes.
    u16::try_from(bytes.len()).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_record_key_format() {
        let account_id = AccountId::generate();
        let reservation_id = ReservationId::generate();
        let key = usage_record_key(&account_id, &reservation_id);

        let id_len = account_id.as_bytes().len();
        assert_eq!(key.len(), 2 + id_len + 16);
        assert_eq!(&key[..2], &(id_len as u16).to_be_bytes());
        assert_eq!(&key[2..2 + id_len], account_id.as_bytes());
        assert_eq!(&key[2 + id_len..], reservation_id.to_bytes());
    }

    #[test]
    fn usage_records_prefix_matches_key() {
        let account_id = AccountId::generate();
        let reservation_id = ReservationId::generate();
        let key = usage_record_key(&account_id, &reservation_id);
        let prefix = usage_records_prefix(&account_id);

        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn prefixes_do_not_collide_on_shared_stems() {
        let a: AccountId = "acct_ab".parse().unwrap();
        let b: AccountId = "acct_abc".parse().unwrap();
        let key_b = usage_record_key(&b, &ReservationId::generate());

        assert!(!key_b.starts_with(&usage_records_prefix(&a)));
    }

    #[test]
    fn reservation_key_length() {
        let key = reservation_key(&ReservationId::generate());
        assert_eq!(key.len(), 16);
    }
}
