//! Core types and logic for the entitlement and usage-metering engine.
//!
//! This crate holds the pure domain layer shared by the store and the
//! service:
//!
//! - **Identifiers**: `AccountId`, `ReservationId`
//! - **Accounts**: `Account`, `Plan`, `SubscriptionStatus`
//! - **Pricing**: `PlanTable`, the typed price-identifier mapping
//! - **Billing events**: `BillingEvent` and the subscription state machine
//! - **Usage**: `Reservation`, `UsageRecord`, `OperationKind`
//!
//! Nothing in this crate performs I/O. The state machine in [`subscription`]
//! is a total function from `(account, event)` to an outcome; persistence and
//! atomicity live in `metering-store`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod error;
pub mod event;
pub mod ids;
pub mod pricing;
pub mod subscription;
pub mod usage;

pub use account::{Account, Plan, SubscriptionStatus, FREE_PLAN_CREDITS};
pub use error::CoreError;
pub use event::{BillingEvent, BillingEventRecord};
pub use ids::{AccountId, IdError, ReservationId};
pub use pricing::{PlanSpec, PlanTable};
pub use subscription::{transition, DropReason, Transition};
pub use usage::{OperationKind, Reservation, UsageOutcome, UsageRecord};
