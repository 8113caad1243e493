//! Policy decision client.
//!
//! [`PolicyClient`] asks a remote decision service whether an agent action may
//! proceed. Allow decisions are memoised in a short-lived LRU cache, pending
//! human approvals are polled to a terminal state, and transport failures are
//! resolved locally according to the configured fail mode with an audit event
//! buffered for later delivery. [`AsyncPolicyClient`] offers the same contract
//! to async call sites.

#![warn(missing_docs, clippy::pedantic)]

mod audit;
mod bridge;
mod cache;
mod cancel;
mod client;
mod error;
mod poller;

#[cfg(test)]
mod testing;

pub use audit::{AuditBuffer, FlushOutcome, INITIAL_FLUSH_BACKOFF, MAX_FLUSH_BACKOFF};
pub use bridge::{AsyncPolicyClient, AsyncPolicyEvaluator};
pub use cache::DecisionCache;
pub use cancel::CancelToken;
pub use client::{EvaluateOptions, PolicyClient, PolicyEvaluator};
pub use error::{Denial, GateError, GateResult};
pub use poller::{
    APPROVED_REASON, ApprovalOutcome, ApprovalPoller, CANCELLED_REASON, Pacer, Pause,
    REVIEWER_DENIED_REASON, ThreadPacer,
};
