use std::time::Duration;

use thiserror::Error;

/// Result alias used by transports.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures while exchanging messages with the decision service.
///
/// None of these carry a usable decision.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport is misconfigured (bad address, runtime unavailable).
    #[error("transport not configured: {reason}")]
    Configuration {
        /// Additional context for the failure.
        reason: String,
    },

    /// Connection-level failure (DNS, refused, TLS, reset).
    #[error("decision service unreachable: {reason}")]
    Connect {
        /// Additional context about the error.
        reason: String,
    },

    /// The exchange did not complete within the configured timeout.
    #[error("decision service timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The service answered with a non-success status.
    #[error("decision service returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, lossily decoded.
        body: String,
    },

    /// The response could not be decoded into the expected shape.
    #[error("malformed response: {reason}")]
    Malformed {
        /// Additional context about the decoding failure.
        reason: String,
    },
}

impl TransportError {
    /// Convenience constructor for configuration issues.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for connection failures.
    #[must_use]
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for undecodable responses.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
