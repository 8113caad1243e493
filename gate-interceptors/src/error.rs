use std::io;

use thiserror::Error;

/// Result alias for intercepted operations.
pub type InterceptResult<T> = Result<T, InterceptError>;

/// Errors surfaced by guarded capabilities.
#[derive(Debug, Error)]
pub enum InterceptError {
    /// Policy blocked the operation before it ran.
    #[error("{message}")]
    Blocked {
        /// User-facing explanation composed from the decision.
        message: String,
    },
    /// The underlying operating system call failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The underlying HTTP fetch failed.
    #[error("fetch failed: {reason}")]
    Fetch {
        /// Human-readable context.
        reason: String,
    },
}

impl InterceptError {
    /// Convenience helper to construct blocked errors.
    #[must_use]
    pub fn blocked(message: impl Into<String>) -> Self {
        Self::Blocked {
            message: message.into(),
        }
    }

    /// Convenience helper to construct fetch errors.
    #[must_use]
    pub fn fetch(reason: impl Into<String>) -> Self {
        Self::Fetch {
            reason: reason.into(),
        }
    }

    /// Returns true when policy blocked the operation.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}
