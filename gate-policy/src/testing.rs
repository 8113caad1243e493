//! In-memory doubles for the transport and pacer seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gate_primitives::{AuditEvent, Decision};
use gate_transport::{
    ApprovalStatus, EvaluateRequest, PolicyTransport, ReviewState, TransportError,
    TransportResult,
};

use crate::cancel::CancelToken;
use crate::poller::{Pacer, Pause};

type Hook = Box<dyn Fn() + Send + Sync>;

/// Transport answering from pre-loaded queues.
///
/// An exhausted evaluate queue fails like an unreachable server; an exhausted
/// status queue reports pending.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    evaluations: Mutex<VecDeque<Result<Decision, ()>>>,
    statuses: Mutex<VecDeque<Result<ApprovalStatus, ()>>>,
    requests: Mutex<Vec<EvaluateRequest>>,
    batches: Mutex<Vec<Vec<AuditEvent>>>,
    audit_hook: Mutex<Option<Hook>>,
    fail_audit: AtomicBool,
    evaluate_calls: AtomicUsize,
    status_calls: AtomicUsize,
    audit_calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_decision(&self, decision: Decision) {
        lock(&self.evaluations).push_back(Ok(decision));
    }

    pub(crate) fn push_evaluate_failure(&self) {
        lock(&self.evaluations).push_back(Err(()));
    }

    pub(crate) fn push_status(&self, state: Result<ReviewState, ()>) {
        lock(&self.statuses).push_back(state.map(|state| ApprovalStatus::new("req-1", state)));
    }

    pub(crate) fn push_status_with_reason(&self, state: ReviewState, reason: &str) {
        lock(&self.statuses).push_back(Ok(ApprovalStatus::new("req-1", state).with_reason(reason)));
    }

    pub(crate) fn fail_audit(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn on_audit(&self, hook: impl Fn() + Send + Sync + 'static) {
        *lock(&self.audit_hook) = Some(Box::new(hook));
    }

    pub(crate) fn clear_on_audit(&self) {
        *lock(&self.audit_hook) = None;
    }

    pub(crate) fn evaluate_calls(&self) -> usize {
        self.evaluate_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn audit_calls(&self) -> usize {
        self.audit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<EvaluateRequest> {
        lock(&self.requests).clone()
    }

    pub(crate) fn audit_batches(&self) -> Vec<Vec<AuditEvent>> {
        lock(&self.batches).clone()
    }
}

impl PolicyTransport for ScriptedTransport {
    fn evaluate(&self, request: &EvaluateRequest) -> TransportResult<Decision> {
        self.evaluate_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        match lock(&self.evaluations).pop_front() {
            Some(Ok(decision)) => Ok(decision),
            Some(Err(())) => Err(TransportError::connect("scripted failure")),
            None => Err(TransportError::connect("connection refused")),
        }
    }

    fn status(&self, request_id: &str) -> TransportResult<ApprovalStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.statuses).pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(())) => Err(TransportError::Timeout {
                after: Duration::from_secs(5),
            }),
            None => Ok(ApprovalStatus::new(request_id, ReviewState::Pending)),
        }
    }

    fn submit_audit(&self, events: &[AuditEvent]) -> TransportResult<()> {
        self.audit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = lock(&self.audit_hook).as_ref() {
            hook();
        }
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(TransportError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        lock(&self.batches).push(events.to_vec());
        Ok(())
    }
}

/// Pacer that never sleeps and counts its waits.
#[derive(Debug, Default)]
pub(crate) struct CountingPacer {
    waits: AtomicU32,
    cancel_on: Option<u32>,
}

impl CountingPacer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reports cancellation on the `wait`-th pause instead of elapsing.
    pub(crate) fn cancelling_on(wait: u32) -> Self {
        Self {
            waits: AtomicU32::new(0),
            cancel_on: Some(wait),
        }
    }

    pub(crate) fn waits(&self) -> u32 {
        self.waits.load(Ordering::SeqCst)
    }
}

impl Pacer for CountingPacer {
    fn pause(&self, _interval: Duration, cancel: &CancelToken) -> Pause {
        if cancel.is_cancelled() {
            return Pause::Cancelled;
        }
        let wait = self.waits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.cancel_on == Some(wait) {
            cancel.cancel();
            return Pause::Cancelled;
        }
        Pause::Elapsed
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
