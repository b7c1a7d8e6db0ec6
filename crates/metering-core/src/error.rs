//! Error types for the metering domain.
//!
//! The domain surfaces most failures through richer channels: identifier
//! parsing through [`crate::IdError`], rejected billing events through
//! [`crate::DropReason`]. What remains here is startup validation.

/// Errors that can occur in core domain logic.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Configuration error (startup validation).
    #[error("configuration error: {0}")]
    Configuration(String),
}
