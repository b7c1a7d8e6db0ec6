//! Error types for the store crate.

use thiserror::Error;

/// Errors that storage operations can produce.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Row encode/decode failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An entity lookup that the operation requires came up empty.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity ("account", "reservation", ...).
        entity: &'static str,
        /// The key that missed.
        id: String,
    },

    /// Balance is short for the requested reservation.
    #[error("insufficient credits: {remaining} remaining, {required} required")]
    InsufficientCredits {
        /// Credits left on the account.
        remaining: i64,
        /// Credits the operation needs.
        required: i64,
    },

    /// Reservation cost must be a positive integer.
    #[error("invalid operation cost: {0}")]
    InvalidCost(i64),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
