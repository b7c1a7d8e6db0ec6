//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//!
//! Reads are lock-free. Every compound read-modify-write takes `write_lock`
//! for its full duration and commits with one `WriteBatch`, which gives the
//! serialization the ledger needs without a full transaction layer.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, Options,
    WriteBatch,
};
use tracing::{debug, warn};

use metering_core::{
    transition, Account, AccountId, BillingEvent, BillingEventRecord, OperationKind, PlanTable,
    Reservation, ReservationId, UsageOutcome, UsageRecord,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{EventOutcome, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<rocksdb::MultiThreaded>>,
    /// Serializes compound read-modify-write operations. Held only inside a
    /// single `Store` method, never across calls.
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Acquire the write lock. A poisoned lock means another writer panicked
    /// mid-batch; batches are all-or-nothing so the data is still consistent.
    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_reservation(&self, reservation_id: &ReservationId) -> Result<Option<Reservation>> {
        let cf = self.cf(cf::RESERVATIONS)?;
        self.db
            .get_cf(&cf, keys::reservation_key(reservation_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Remove a reservation and append the finalized usage record in one
    /// batch; for refunds, re-increment the balance too. Idempotent: if the
    /// reservation row is already gone (finalized by the caller or by the
    /// sweeper), this does nothing.
    fn finalize_reservation(
        &self,
        reservation: &Reservation,
        outcome: UsageOutcome,
    ) -> Result<Option<i64>> {
        let _guard = self.lock_writes();

        if self.get_reservation(&reservation.id)?.is_none() {
            debug!(
                reservation_id = %reservation.id,
                "reservation already finalized, skipping"
            );
            return Ok(None);
        }

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_reservations = self.cf(cf::RESERVATIONS)?;
        let cf_usage = self.cf(cf::USAGE_RECORDS)?;

        let record = UsageRecord::from_reservation(reservation, outcome);
        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_reservations, keys::reservation_key(&reservation.id));
        batch.put_cf(
            &cf_usage,
            keys::usage_record_key(&reservation.account_id, &reservation.id),
            Self::serialize(&record)?,
        );

        let mut new_remaining = None;
        if outcome == UsageOutcome::Refunded {
            // The account may have been renewed or deleted while the
            // reservation was outstanding; never push the balance above the
            // current total, and drop the refund if the row is gone.
            if let Some(mut account) = self.get_account(&reservation.account_id)? {
                account.credits_remaining = (account.credits_remaining + reservation.cost_credits)
                    .min(account.credits_total);
                account.updated_at = Utc::now();
                new_remaining = Some(account.credits_remaining);
                batch.put_cf(
                    &cf_accounts,
                    keys::account_key(&account.account_id),
                    Self::serialize(&account)?,
                );
            } else {
                warn!(
                    account_id = %reservation.account_id,
                    "refund target account missing, recording outcome only"
                );
            }
        }

        self.db.write(batch)?;
        Ok(new_remaining)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn put_account(&self, account: &Account) -> Result<()> {
        let cf = self.cf(cf::ACCOUNTS)?;
        let value = Self::serialize(account)?;

        self.db
            .put_cf(&cf, keys::account_key(&account.account_id), value)?;

        Ok(())
    }

    fn create_account_if_absent(&self, account: &Account) -> Result<bool> {
        let _guard = self.lock_writes();

        if self.get_account(&account.account_id)?.is_some() {
            return Ok(false);
        }

        let cf = self.cf(cf::ACCOUNTS)?;
        let value = Self::serialize(account)?;
        self.db
            .put_cf(&cf, keys::account_key(&account.account_id), value)?;

        Ok(true)
    }

    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>> {
        let cf = self.cf(cf::ACCOUNTS)?;

        self.db
            .get_cf(&cf, keys::account_key(account_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn delete_account(&self, account_id: &AccountId) -> Result<()> {
        let _guard = self.lock_writes();

        let account = self
            .get_account(account_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })?;

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_subscriptions = self.cf(cf::SUBSCRIPTIONS)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_accounts, keys::account_key(account_id));
        if let Some(subscription_ref) = &account.active_subscription_ref {
            batch.delete_cf(&cf_subscriptions, keys::subscription_key(subscription_ref));
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn find_account_by_subscription(&self, subscription_ref: &str) -> Result<Option<Account>> {
        let cf = self.cf(cf::SUBSCRIPTIONS)?;

        let Some(id_bytes) = self.db.get_cf(&cf, keys::subscription_key(subscription_ref))? else {
            return Ok(None);
        };

        let account_id: AccountId = std::str::from_utf8(&id_bytes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?
            .parse()
            .map_err(|e: metering_core::IdError| StoreError::Serialization(e.to_string()))?;

        self.get_account(&account_id)
    }

    // =========================================================================
    // Billing Events
    // =========================================================================

    fn get_billing_event(&self, event_id: &str) -> Result<Option<BillingEventRecord>> {
        let cf = self.cf(cf::BILLING_EVENTS)?;

        self.db
            .get_cf(&cf, keys::billing_event_key(event_id))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn apply_billing_event(&self, event: &BillingEvent, plans: &PlanTable) -> Result<EventOutcome> {
        let _guard = self.lock_writes();

        // Idempotency check and application must land in the same critical
        // section, otherwise a redelivered event could double-apply.
        if self.get_billing_event(event.event_id())?.is_some() {
            debug!(event_id = event.event_id(), "duplicate billing event");
            return Ok(EventOutcome::Duplicate);
        }

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_subscriptions = self.cf(cf::SUBSCRIPTIONS)?;
        let cf_events = self.cf(cf::BILLING_EVENTS)?;

        let account = match event {
            // Checkout may land before any other contact with the account;
            // start from a fresh free-tier row in that case.
            BillingEvent::CheckoutCompleted { account_id, .. } => Some(
                self.get_account(account_id)?
                    .unwrap_or_else(|| Account::new(account_id.clone())),
            ),
            _ => match event.subscription_ref() {
                Some(subscription_ref) => self.find_account_by_subscription(subscription_ref)?,
                None => None,
            },
        };

        let Some(account) = account else {
            // An event for an unknown account or subscription is stale by
            // definition; record it so a redelivery stays a no-op.
            warn!(
                event_id = event.event_id(),
                event_type = event.event_type(),
                "billing event targets no known account, dropping"
            );
            let record = BillingEventRecord::dropped(event);
            self.db.put_cf(
                &cf_events,
                keys::billing_event_key(event.event_id()),
                Self::serialize(&record)?,
            )?;
            return Ok(EventOutcome::Dropped(
                metering_core::DropReason::StaleReference,
            ));
        };

        match transition(&account, event, plans, Utc::now()) {
            Ok(next) => {
                let mut batch = WriteBatch::default();
                batch.put_cf(
                    &cf_accounts,
                    keys::account_key(&next.account_id),
                    Self::serialize(&next)?,
                );

                // Keep the subscription index in step with the row.
                if account.active_subscription_ref != next.active_subscription_ref {
                    if let Some(old_ref) = &account.active_subscription_ref {
                        batch.delete_cf(&cf_subscriptions, keys::subscription_key(old_ref));
                    }
                    if let Some(new_ref) = &next.active_subscription_ref {
                        batch.put_cf(
                            &cf_subscriptions,
                            keys::subscription_key(new_ref),
                            next.account_id.as_bytes(),
                        );
                    }
                }

                batch.put_cf(
                    &cf_events,
                    keys::billing_event_key(event.event_id()),
                    Self::serialize(&BillingEventRecord::applied(event))?,
                );

                self.db.write(batch)?;
                Ok(EventOutcome::Applied(next))
            }
            Err(reason) => {
                warn!(
                    event_id = event.event_id(),
                    event_type = event.event_type(),
                    %reason,
                    "billing event dropped"
                );
                self.db.put_cf(
                    &cf_events,
                    keys::billing_event_key(event.event_id()),
                    Self::serialize(&BillingEventRecord::dropped(event))?,
                )?;
                Ok(EventOutcome::Dropped(reason))
            }
        }
    }

    // =========================================================================
    // Credit Reservations
    // =========================================================================

    fn reserve_credits(
        &self,
        account_id: &AccountId,
        operation_kind: OperationKind,
        cost: i64,
    ) -> Result<Reservation> {
        if cost < 1 {
            return Err(StoreError::InvalidCost(cost));
        }

        let _guard = self.lock_writes();

        let mut account = self
            .get_account(account_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            })?;

        if account.credits_remaining < cost {
            return Err(StoreError::InsufficientCredits {
                remaining: account.credits_remaining,
                required: cost,
            });
        }

        account.credits_remaining -= cost;
        account.updated_at = Utc::now();

        let reservation = Reservation::new(account_id.clone(), operation_kind, cost);

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_reservations = self.cf(cf::RESERVATIONS)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(account_id),
            Self::serialize(&account)?,
        );
        batch.put_cf(
            &cf_reservations,
            keys::reservation_key(&reservation.id),
            Self::serialize(&reservation)?,
        );

        self.db.write(batch)?;
        Ok(reservation)
    }

    fn commit_reservation(&self, reservation: &Reservation) -> Result<()> {
        self.finalize_reservation(reservation, UsageOutcome::Committed)?;
        Ok(())
    }

    fn refund_reservation(&self, reservation: &Reservation) -> Result<i64> {
        let new_remaining = self.finalize_reservation(reservation, UsageOutcome::Refunded)?;
        match new_remaining {
            Some(remaining) => Ok(remaining),
            // Already finalized or account gone; report the live balance.
            None => Ok(self
                .get_account(&reservation.account_id)?
                .map_or(0, |a| a.credits_remaining)),
        }
    }

    fn sweep_stale_reservations(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cf = self.cf(cf::RESERVATIONS)?;

        // Collect outside the write lock; refund_reservation re-checks each
        // row, so one finalized concurrently is simply skipped.
        let mut stale = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            let reservation: Reservation = Self::deserialize(&value)?;
            if reservation.created_at < cutoff {
                stale.push(reservation);
            }
        }

        let mut refunded = 0;
        for reservation in stale {
            if self
                .finalize_reservation(&reservation, UsageOutcome::Refunded)?
                .is_some()
            {
                debug!(
                    reservation_id = %reservation.id,
                    account_id = %reservation.account_id,
                    cost = reservation.cost_credits,
                    "refunded stale reservation"
                );
                refunded += 1;
            }
        }

        Ok(refunded)
    }

    // =========================================================================
    // Usage Audit Trail
    // =========================================================================

    fn count_usage_since(
        &self,
        account_id: &AccountId,
        operation_kind: OperationKind,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let cf = self.cf(cf::USAGE_RECORDS)?;
        let prefix = keys::usage_records_prefix(account_id);

        // ULID keys are time-ordered, so start the scan at the first key
        // that could have been created at `since`.
        let mut start = prefix.clone();
        start.extend_from_slice(&keys::reservation_lower_bound(since));

        let mut count = 0;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: UsageRecord = Self::deserialize(&value)?;
            if record.operation_kind == operation_kind {
                count += 1;
            }
        }

        Ok(count)
    }

    fn list_usage(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UsageRecord>> {
        let cf = self.cf(cf::USAGE_RECORDS)?;
        let prefix = keys::usage_records_prefix(account_id);

        // Seek past the account's range, then walk backwards for newest-first.
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xff; 17]);

        let mut records = Vec::new();
        let mut skipped = 0;

        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if records.len() >= limit {
                break;
            }
            records.push(Self::deserialize(&value)?);
        }

        Ok(records)
    }
}
