//! Request/response exchange with the policy decision service.
//!
//! [`PolicyTransport`] is the blocking seam the client core is written
//! against; [`HttpTransport`] implements it over HTTP/HTTPS using `hyper`.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod http;
mod http_client;
mod wire;

use gate_primitives::{AuditEvent, Decision};
use url::Url;

pub use error::{TransportError, TransportResult};
pub use http::HttpTransport;
pub use wire::{
    ApprovalStatus, AuditBatch, EvaluateRequest, EvaluateResponse, ReviewState, StatusResponse,
};

/// Evaluation endpoint path.
pub const EVALUATE_PATH: &str = "/admin/api/v1/policy/evaluate";
/// Audit ingestion endpoint path.
pub const AUDIT_PATH: &str = "/admin/api/v1/audit/events";

/// Returns the status endpoint path for `request_id`.
///
/// The id is percent-encoded as a single path segment, so `/` and spaces
/// cannot escape it. Ids of `.` or `..` are dropped by the encoder.
///
/// # Errors
///
/// Returns [`TransportError::Configuration`] if the path cannot be assembled.
pub fn status_path(request_id: &str) -> TransportResult<String> {
    let mut url = Url::parse("http://localhost/")
        .map_err(|err| TransportError::configuration(format!("invalid status base: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| TransportError::configuration("status base cannot hold a path"))?
        .pop_if_empty()
        .extend(EVALUATE_PATH.split('/').filter(|segment| !segment.is_empty()))
        .push(request_id)
        .push("status");
    Ok(url.path().to_owned())
}

/// Blocking exchange with the decision service.
///
/// Every call is bounded by the implementation's timeout. Implementations must
/// be safe to call from many threads at once.
pub trait PolicyTransport: Send + Sync {
    /// Submits an evaluation request and decodes the decision.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no decision could be obtained,
    /// including when the response is not a well-formed decision.
    fn evaluate(&self, request: &EvaluateRequest) -> TransportResult<Decision>;

    /// Fetches the review status of a pending evaluation.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the status could not be obtained.
    fn status(&self, request_id: &str) -> TransportResult<ApprovalStatus>;

    /// Delivers a batch of locally recorded audit events.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the batch was not accepted.
    fn submit_audit(&self, events: &[AuditEvent]) -> TransportResult<()>;
}
