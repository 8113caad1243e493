//! Client SDK for a remote agent policy decision service.
//!
//! Depend on this crate to ask a decision server whether agent actions may
//! proceed. It bundles the internal crates behind feature flags so embedders
//! can leave out the interception decorators or tracing setup.

#![warn(missing_docs, clippy::pedantic)]

/// Re-export the shared data model.
pub use gate_primitives as primitives;

/// Client configuration (enabled by `client` feature).
#[cfg(feature = "client")]
pub use gate_config as config;

/// Wire types and HTTP transport (enabled by `client` feature).
#[cfg(feature = "client")]
pub use gate_transport as transport;

/// Decision client, cache, poller, and audit buffer (enabled by `client` feature).
#[cfg(feature = "client")]
pub use gate_policy as policy;

/// Policy-checking capability decorators (enabled by `interceptors` feature).
#[cfg(feature = "interceptors")]
pub use gate_interceptors as interceptors;

/// Tracing subscriber setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use gate_telemetry as telemetry;

/// Items most embedders need.
pub mod prelude {
    pub use gate_primitives::{ActionDescriptor, ActionType, Decision, Destination, Outcome};

    #[cfg(feature = "client")]
    pub use gate_config::{FailMode, GateConfig};
    #[cfg(feature = "client")]
    pub use gate_policy::{
        AsyncPolicyClient, CancelToken, EvaluateOptions, FlushOutcome, GateError, GateResult,
        PolicyClient, PolicyEvaluator,
    };

    #[cfg(feature = "interceptors")]
    pub use gate_interceptors::{
        CommandSpec, GuardedFetcher, GuardedFileOpener, GuardedLauncher, InterceptError,
    };
}
