//! Shared error definitions for policy-gate primitives.

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the primitives crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided agent identifier could not be parsed.
    #[error("invalid agent id: {source}")]
    InvalidAgentId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Action descriptor failed validation.
    #[error("invalid action: {reason}")]
    InvalidAction {
        /// Human-readable reason for rejection.
        reason: String,
    },
}

impl Error {
    /// Convenience constructor for action validation failures.
    #[must_use]
    pub fn invalid_action(reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            reason: reason.into(),
        }
    }
}
