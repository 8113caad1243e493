use std::fmt;
use std::time::Duration;

use gate_primitives::Decision;
use thiserror::Error;

/// Result alias for policy client operations.
pub type GateResult<T> = Result<T, GateError>;

/// Rule metadata carried by a denied action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Denial {
    /// Identifier of the rule that matched.
    pub rule_id: String,
    /// Human-readable name of the rule that matched.
    pub rule_name: String,
    /// Reason reported by the server or the reviewer.
    pub reason: String,
    /// Link to remediation guidance.
    pub help_url: String,
    /// Remediation guidance shown to the user.
    pub help_text: String,
    /// Approval request that produced this denial, if any.
    pub request_id: String,
}

impl Denial {
    /// Captures the rule metadata of a decision.
    #[must_use]
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            rule_id: decision.rule_id().to_owned(),
            rule_name: decision.rule_name().to_owned(),
            reason: decision.reason().to_owned(),
            help_url: decision.help_url().to_owned(),
            help_text: decision.help_text().to_owned(),
            request_id: decision.request_id().to_owned(),
        }
    }

    /// Message shown to the user when the underlying action is blocked.
    #[must_use]
    pub fn blocked_message(&self) -> String {
        let mut message = format!("action denied - {}", self.reason);
        if !self.help_text.is_empty() {
            message.push_str(". ");
            message.push_str(&self.help_text);
        }
        message
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rule_id.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{} (rule {})", self.reason, self.rule_id)
        }
    }
}

/// Errors surfaced by [`crate::PolicyClient`].
#[derive(Debug, Error)]
pub enum GateError {
    /// The server, or a reviewer, denied the action.
    #[error("policy denied: {0}")]
    PolicyDenied(Box<Denial>),
    /// No decision was available and the client runs fail-closed.
    #[error("policy server unreachable: {reason}")]
    ServerUnreachable {
        /// Transport failure that left the action undecided.
        reason: String,
    },
    /// Approval polling exhausted its attempt budget.
    #[error("approval {request_id} timed out after {waited:?}")]
    ApprovalTimeout {
        /// Pending approval request.
        request_id: String,
        /// Total polling window that elapsed.
        waited: Duration,
    },
    /// Approval polling was cancelled before a reviewer answered.
    #[error("approval {request_id} cancelled")]
    ApprovalCancelled {
        /// Pending approval request.
        request_id: String,
    },
    /// The client could not be constructed from its configuration.
    #[error("invalid client configuration: {reason}")]
    Configuration {
        /// Human-readable context.
        reason: String,
    },
    /// The async bridge failed to run the blocking evaluation.
    #[error("async bridge failed: {reason}")]
    Bridge {
        /// Human-readable context.
        reason: String,
    },
}

impl GateError {
    /// Builds a [`GateError::PolicyDenied`] from a deny decision.
    #[must_use]
    pub fn denied(decision: &Decision) -> Self {
        Self::PolicyDenied(Box::new(Denial::from_decision(decision)))
    }

    /// Convenience helper to construct unreachable-server errors.
    #[must_use]
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self::ServerUnreachable {
            reason: reason.into(),
        }
    }

    /// Convenience helper to construct configuration errors.
    #[must_use]
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Convenience helper to construct bridge errors.
    #[must_use]
    pub fn bridge(reason: impl Into<String>) -> Self {
        Self::Bridge {
            reason: reason.into(),
        }
    }

    /// Returns true for deny-shaped errors: explicit denials, approval timeouts
    /// and cancelled approvals.
    #[must_use]
    pub const fn is_denial(&self) -> bool {
        matches!(
            self,
            Self::PolicyDenied(_) | Self::ApprovalTimeout { .. } | Self::ApprovalCancelled { .. }
        )
    }

    /// Returns the rule metadata when the error is an explicit denial.
    #[must_use]
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::PolicyDenied(denial) => Some(denial),
            _ => None,
        }
    }

    /// Message shown to the user when this error blocks an action.
    #[must_use]
    pub fn blocked_message(&self) -> String {
        match self {
            Self::PolicyDenied(denial) => denial.blocked_message(),
            Self::ApprovalTimeout { waited, .. } => format!(
                "action denied - approval timeout after {}s",
                waited.as_secs_f64()
            ),
            Self::ApprovalCancelled { .. } => "action denied - approval cancelled".to_owned(),
            other => format!("action blocked - {other}"),
        }
    }
}
