//! JSON shapes exchanged with the decision service.

use gate_primitives::{
    ActionDescriptor, ActionType, AuditEvent, Decision, Destination, Identity, Outcome,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{TransportError, TransportResult};

/// Body of `POST /admin/api/v1/policy/evaluate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluateRequest {
    action_type: ActionType,
    action_name: String,
    protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    framework: Option<String>,
    identity_name: String,
    identity_roles: Vec<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    arguments: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<Destination>,
}

impl EvaluateRequest {
    /// Builds the request body for `action` on behalf of `identity`.
    #[must_use]
    pub fn new(
        action: &ActionDescriptor,
        identity: &Identity,
        protocol: impl Into<String>,
        framework: Option<String>,
    ) -> Self {
        Self {
            action_type: action.action_type().clone(),
            action_name: action.action_name().to_owned(),
            protocol: protocol.into(),
            framework: framework.filter(|framework| !framework.is_empty()),
            identity_name: identity.name().to_owned(),
            identity_roles: identity.roles().to_vec(),
            arguments: action.arguments().clone(),
            destination: action.destination().cloned(),
        }
    }

    /// Returns the action type being evaluated.
    #[must_use]
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// Returns the action name being evaluated.
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Returns the identity name.
    #[must_use]
    pub fn identity_name(&self) -> &str {
        &self.identity_name
    }

    /// Returns the protocol tag.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }
}

/// Raw evaluation response. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluateResponse {
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    rule_id: Option<String>,
    #[serde(default)]
    rule_name: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    help_url: Option<String>,
    #[serde(default)]
    help_text: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    latency_ms: Option<f64>,
}

impl EvaluateResponse {
    /// Decodes a response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Malformed`] when the body is not a JSON object
    /// of the expected shape.
    pub fn from_slice(body: &[u8]) -> TransportResult<Self> {
        serde_json::from_slice(body).map_err(|err| {
            TransportError::malformed(format!("failed to decode evaluation response: {err}"))
        })
    }

    /// Converts the response into a [`Decision`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Malformed`] when the `decision` field is missing
    /// or carries an unknown value.
    pub fn into_decision(self) -> TransportResult<Decision> {
        let raw = self
            .decision
            .ok_or_else(|| TransportError::malformed("evaluation response has no decision"))?;
        let outcome = Outcome::parse(raw.trim()).ok_or_else(|| {
            TransportError::malformed(format!("unknown decision `{raw}` in evaluation response"))
        })?;

        Ok(Decision::new(outcome)
            .with_rule(
                self.rule_id.unwrap_or_default(),
                self.rule_name.unwrap_or_default(),
            )
            .with_reason(self.reason.unwrap_or_default())
            .with_help(
                self.help_url.unwrap_or_default(),
                self.help_text.unwrap_or_default(),
            )
            .with_request_id(self.request_id.unwrap_or_default())
            .with_latency_ms(latency_to_millis(self.latency_ms)))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn latency_to_millis(latency: Option<f64>) -> u64 {
    match latency {
        Some(value) if value.is_finite() && value > 0.0 => value.round() as u64,
        _ => 0,
    }
}

/// Raw body of `GET /admin/api/v1/policy/evaluate/{request_id}/status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl StatusResponse {
    /// Decodes a status body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Malformed`] when the body is not a JSON object.
    pub fn from_slice(body: &[u8]) -> TransportResult<Self> {
        serde_json::from_slice(body).map_err(|err| {
            TransportError::malformed(format!("failed to decode status response: {err}"))
        })
    }

    /// Interprets the raw status.
    #[must_use]
    pub fn into_status(self) -> ApprovalStatus {
        // Older servers only report the current decision.
        let raw = self.status.or(self.decision).unwrap_or_default();
        ApprovalStatus {
            request_id: self.request_id.unwrap_or_default(),
            state: ReviewState::from_wire(&raw),
            reason: self.reason.filter(|reason| !reason.trim().is_empty()),
            updated_at: self.updated_at,
        }
    }
}

/// Review state of a pending evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    /// Still awaiting a reviewer.
    Pending,
    /// A reviewer approved the action.
    Approved,
    /// A reviewer denied the action.
    Denied,
}

impl ReviewState {
    /// Maps a wire status onto a review state. Unrecognised values count as pending.
    #[must_use]
    pub fn from_wire(raw: &str) -> Self {
        match raw.trim() {
            "approved" | "allow" => Self::Approved,
            "denied" | "deny" => Self::Denied,
            _ => Self::Pending,
        }
    }

    /// Returns true for approved and denied states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Decoded review status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalStatus {
    /// Request the status refers to.
    pub request_id: String,
    /// Current review state.
    pub state: ReviewState,
    /// Reviewer supplied reason, if any.
    pub reason: Option<String>,
    /// Time of the last status change as reported by the server.
    pub updated_at: Option<String>,
}

impl ApprovalStatus {
    /// Builds a status without reason or timestamp.
    #[must_use]
    pub fn new(request_id: impl Into<String>, state: ReviewState) -> Self {
        Self {
            request_id: request_id.into(),
            state,
            reason: None,
            updated_at: None,
        }
    }

    /// Attaches a reviewer reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Body of `POST /admin/api/v1/audit/events`.
#[derive(Debug, Serialize)]
pub struct AuditBatch<'a> {
    events: &'a [AuditEvent],
}

impl<'a> AuditBatch<'a> {
    /// Wraps a slice of events.
    #[must_use]
    pub const fn new(events: &'a [AuditEvent]) -> Self {
        Self { events }
    }
}
