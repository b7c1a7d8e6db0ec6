//! Credit consumption guard.
//!
//! Wraps the store's atomic reserve/commit/refund so handlers follow one
//! shape: reserve, call the provider, commit on success, refund on failure.
//! A background sweep refunds reservations abandoned by crashed or timed-out
//! requests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use metering_core::{AccountId, OperationKind, Reservation};
use metering_store::{Result, Store};

/// Guard over the shared credit balance.
#[derive(Clone)]
pub struct CreditGuard {
    store: Arc<dyn Store>,
}

impl CreditGuard {
    /// Create a guard over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Atomically check-and-decrement the balance.
    ///
    /// # Errors
    ///
    /// Propagates `InvalidCost`, `NotFound`, and `InsufficientCredits` from
    /// the store; on any error no decrement has happened.
    pub fn reserve(
        &self,
        account_id: &AccountId,
        kind: OperationKind,
        cost: i64,
    ) -> Result<Reservation> {
        self.store.reserve_credits(account_id, kind, cost)
    }

    /// Keep the decrement after a successful provider call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails; the sweep will then refund
    /// the reservation, which over-credits rather than over-charges.
    pub fn commit(&self, reservation: &Reservation) -> Result<()> {
        self.store.commit_reservation(reservation)
    }

    /// Reverse the decrement after a failed provider call.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails; the sweep retries the
    /// refund on its next pass.
    pub fn refund(&self, reservation: &Reservation) -> Result<i64> {
        self.store.refund_reservation(reservation)
    }

    /// Run the reservation sweep forever.
    ///
    /// Refunds reservations older than `timeout` every `interval`. The
    /// timeout must exceed the request timeout so a reservation still in
    /// flight is never swept out from under its request.
    pub async fn run_sweeper(self, interval: Duration, timeout: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let cutoff = Utc::now()
                - chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(300));
            match self.store.sweep_stale_reservations(cutoff) {
                Ok(0) => {}
                Ok(refunded) => info!(refunded, "swept stale reservations"),
                Err(e) => error!(error = %e, "reservation sweep failed"),
            }
        }
    }
}
