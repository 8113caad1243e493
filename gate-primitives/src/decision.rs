//! Decision types returned by the decision service.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Action is permitted.
    Allow,
    /// Action is rejected.
    Deny,
    /// Action awaits human review before it becomes terminal.
    ApprovalRequired,
}

impl Outcome {
    /// Parses the wire representation, returning `None` for unknown values.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            "approval_required" => Some(Self::ApprovalRequired),
            _ => None,
        }
    }

    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::ApprovalRequired => "approval_required",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of an evaluation.
///
/// `request_id` is only meaningful for [`Outcome::ApprovalRequired`]; when it is
/// empty the decision cannot be polled and is handed back undecided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "decision")]
    outcome: Outcome,
    #[serde(default)]
    rule_id: String,
    #[serde(default)]
    rule_name: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    help_url: String,
    #[serde(default)]
    help_text: String,
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    latency_ms: u64,
}

impl Decision {
    /// Reason recorded on locally synthesised fail-open decisions.
    pub const FAIL_OPEN_REASON: &'static str = "fail-open";
    /// Reason recorded on locally synthesised fail-closed decisions.
    pub const FAIL_CLOSED_REASON: &'static str = "fail-closed";

    /// Creates a decision with the supplied outcome and empty metadata.
    #[must_use]
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            rule_id: String::new(),
            rule_name: String::new(),
            reason: String::new(),
            help_url: String::new(),
            help_text: String::new(),
            request_id: String::new(),
            latency_ms: 0,
        }
    }

    /// Allow decision synthesised locally when the service is unreachable.
    #[must_use]
    pub fn fail_open() -> Self {
        Self::new(Outcome::Allow).with_reason(Self::FAIL_OPEN_REASON)
    }

    /// Sets the matching rule identifier and name.
    #[must_use]
    pub fn with_rule(mut self, rule_id: impl Into<String>, rule_name: impl Into<String>) -> Self {
        self.rule_id = rule_id.into();
        self.rule_name = rule_name.into();
        self
    }

    /// Sets the decision reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Sets the help link and guidance text.
    #[must_use]
    pub fn with_help(mut self, help_url: impl Into<String>, help_text: impl Into<String>) -> Self {
        self.help_url = help_url.into();
        self.help_text = help_text.into();
        self
    }

    /// Sets the opaque request identifier used for approval polling.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Sets the server-side evaluation latency.
    #[must_use]
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Returns the outcome.
    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Returns true when the action may proceed.
    #[must_use]
    pub fn is_allow(&self) -> bool {
        self.outcome == Outcome::Allow
    }

    /// Returns true when the action must be blocked.
    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.outcome == Outcome::Deny
    }

    /// Returns true when the decision still awaits review.
    #[must_use]
    pub fn is_approval_required(&self) -> bool {
        self.outcome == Outcome::ApprovalRequired
    }

    /// Returns true when the decision can be polled for a final answer.
    #[must_use]
    pub fn is_pollable(&self) -> bool {
        self.is_approval_required() && !self.request_id.trim().is_empty()
    }

    /// Returns the matching rule identifier.
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Returns the matching rule name.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Returns the decision reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the help link for the matching rule.
    #[must_use]
    pub fn help_url(&self) -> &str {
        &self.help_url
    }

    /// Returns human-readable guidance for denied actions.
    #[must_use]
    pub fn help_text(&self) -> &str {
        &self.help_text
    }

    /// Returns the opaque request identifier.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the server-side latency in milliseconds.
    #[must_use]
    pub const fn latency_ms(&self) -> u64 {
        self.latency_ms
    }
}
