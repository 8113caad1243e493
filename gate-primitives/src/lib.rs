//! Core shared types for policy-gate clients and interception adapters.

#![warn(missing_docs, clippy::pedantic)]

mod action;
mod audit;
mod decision;
mod error;
mod identity;
mod ids;

/// Action descriptors submitted for evaluation and their cache fingerprint.
pub use action::{ActionDescriptor, ActionType, CacheKey, Destination};
/// Locally recorded decision events.
pub use audit::AuditEvent;
/// Decision outcomes returned by the decision service.
pub use decision::{Decision, Outcome};
/// Error type and result alias shared across the SDK.
pub use error::{Error, Result};
/// Identity on whose behalf an action is evaluated.
pub use identity::{DEFAULT_ROLE, Identity};
/// Unique identifier for the agent process owning a client.
pub use ids::AgentId;
