//! Audit events recorded when a decision is taken locally.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::action::{ActionDescriptor, ActionType, Destination};
use crate::decision::{Decision, Outcome};
use crate::ids::AgentId;

/// Decision taken without reaching the decision service.
///
/// Produced exactly when a fail-open or fail-closed decision is synthesised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    action_type: ActionType,
    action_name: String,
    arguments: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<Destination>,
    decision: Outcome,
    reason: String,
    timestamp: DateTime<Utc>,
    agent_id: AgentId,
}

impl AuditEvent {
    /// Records `decision` for `action` at the current time.
    #[must_use]
    pub fn record(action: &ActionDescriptor, decision: &Decision, agent_id: AgentId) -> Self {
        Self::record_at(action, decision, agent_id, Utc::now())
    }

    /// Records `decision` for `action` at an explicit timestamp.
    #[must_use]
    pub fn record_at(
        action: &ActionDescriptor,
        decision: &Decision,
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action_type: action.action_type().clone(),
            action_name: action.action_name().to_owned(),
            arguments: action.arguments().clone(),
            destination: action.destination().cloned(),
            decision: decision.outcome(),
            reason: decision.reason().to_owned(),
            timestamp,
            agent_id,
        }
    }

    /// Returns the action type of the recorded action.
    #[must_use]
    pub fn action_type(&self) -> &ActionType {
        &self.action_type
    }

    /// Returns the action name of the recorded action.
    #[must_use]
    pub fn action_name(&self) -> &str {
        &self.action_name
    }

    /// Returns the locally taken outcome.
    #[must_use]
    pub const fn decision(&self) -> Outcome {
        self.decision
    }

    /// Returns the reason attached to the local decision.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns when the decision was taken.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the agent that took the decision.
    #[must_use]
    pub const fn agent_id(&self) -> AgentId {
        self.agent_id
    }
}
