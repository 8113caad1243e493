//! In-memory queue of audit events awaiting delivery.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use gate_primitives::AuditEvent;
use gate_transport::PolicyTransport;
use tracing::{debug, warn};

/// Delay before the first opportunistic retry after a failed delivery.
pub const INITIAL_FLUSH_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for the delay between opportunistic retries.
pub const MAX_FLUSH_BACKOFF: Duration = Duration::from_secs(60);

/// Result of a single [`AuditBuffer::flush`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered.
    Empty,
    /// The batch of this many events was accepted by the server.
    Delivered(usize),
    /// Delivery failed; this many events were put back at the front.
    Requeued(usize),
    /// A recent attempt failed or is in flight; nothing was sent.
    Deferred,
}

#[derive(Debug)]
struct Queue {
    events: VecDeque<AuditEvent>,
    retry_at: Option<Instant>,
    backoff: Duration,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            events: VecDeque::new(),
            retry_at: None,
            backoff: INITIAL_FLUSH_BACKOFF,
        }
    }
}

/// Append-only buffer of audit events, drained in batches.
///
/// Opportunistic flushes through [`AuditBuffer::flush_if_due`] back off
/// exponentially after a failed delivery, so an unavailable audit endpoint
/// costs at most one request per backoff window.
#[derive(Debug, Default)]
pub struct AuditBuffer {
    queue: Mutex<Queue>,
}

impl AuditBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: AuditEvent) {
        self.lock().events.push_back(event);
    }

    /// Returns the number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Returns true when no events are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Delivers every buffered event in one batch, ignoring any backoff.
    ///
    /// Events appended while the batch is in flight stay buffered. A failed
    /// batch is restored ahead of them so submission order is preserved.
    /// Failures are logged and never returned.
    pub fn flush(&self, transport: &dyn PolicyTransport) -> FlushOutcome {
        self.flush_at(transport, Instant::now(), false)
    }

    /// Like [`AuditBuffer::flush`], but returns [`FlushOutcome::Deferred`]
    /// without contacting the server while a retry delay is pending.
    pub fn flush_if_due(&self, transport: &dyn PolicyTransport) -> FlushOutcome {
        self.flush_at(transport, Instant::now(), true)
    }

    pub(crate) fn flush_at(
        &self,
        transport: &dyn PolicyTransport,
        now: Instant,
        respect_backoff: bool,
    ) -> FlushOutcome {
        let batch: Vec<AuditEvent> = {
            let mut queue = self.lock();
            if queue.events.is_empty() {
                return FlushOutcome::Empty;
            }
            if respect_backoff && queue.retry_at.is_some_and(|at| now < at) {
                return FlushOutcome::Deferred;
            }
            // Claim the window so concurrent callers defer while this batch is in flight.
            queue.retry_at = now.checked_add(queue.backoff);
            queue.events.drain(..).collect()
        };

        match transport.submit_audit(&batch) {
            Ok(()) => {
                let mut queue = self.lock();
                queue.retry_at = None;
                queue.backoff = INITIAL_FLUSH_BACKOFF;
                debug!(events = batch.len(), "delivered audit batch");
                FlushOutcome::Delivered(batch.len())
            }
            Err(error) => {
                let count = batch.len();
                let mut queue = self.lock();
                let retry_in = queue.backoff;
                queue.retry_at = now.checked_add(retry_in);
                queue.backoff = retry_in.saturating_mul(2).min(MAX_FLUSH_BACKOFF);
                warn!(
                    events = count,
                    retry_in_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
                    %error,
                    "audit flush failed, keeping events buffered"
                );
                for event in batch.into_iter().rev() {
                    queue.events.push_front(event);
                }
                FlushOutcome::Requeued(count)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<AuditEvent> {
        self.lock().events.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use gate_primitives::{ActionDescriptor, ActionType, AgentId, Decision, Outcome};

    use super::*;
    use crate::testing::ScriptedTransport;

    fn event(name: &str) -> AuditEvent {
        AuditEvent::record(
            &ActionDescriptor::new(ActionType::CommandExec, name),
            &Decision::new(Outcome::Allow).with_reason("fail-open"),
            AgentId::random(),
        )
    }

    fn names(events: &[AuditEvent]) -> Vec<String> {
        events.iter().map(|e| e.action_name().to_owned()).collect()
    }

    #[test]
    fn flush_of_empty_buffer_does_not_call_transport() {
        let transport = ScriptedTransport::new();
        let buffer = AuditBuffer::new();

        assert_eq!(buffer.flush(&transport), FlushOutcome::Empty);
        assert_eq!(transport.audit_calls(), 0);
    }

    #[test]
    fn successful_flush_delivers_in_order_and_clears() {
        let transport = ScriptedTransport::new();
        let buffer = AuditBuffer::new();
        buffer.push(event("a"));
        buffer.push(event("b"));

        assert_eq!(buffer.flush(&transport), FlushOutcome::Delivered(2));
        assert!(buffer.is_empty());
        let batches = transport.audit_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(names(&batches[0]), ["a", "b"]);
    }

    #[test]
    fn failed_flush_requeues_ahead_of_newer_events() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.fail_audit(true);
        let buffer = Arc::new(AuditBuffer::new());
        buffer.push(event("a"));
        buffer.push(event("b"));

        {
            let buffer = Arc::clone(&buffer);
            transport.on_audit(move || buffer.push(event("c")));
        }
        assert_eq!(buffer.flush(transport.as_ref()), FlushOutcome::Requeued(2));
        assert_eq!(names(&buffer.snapshot()), ["a", "b", "c"]);

        transport.fail_audit(false);
        transport.clear_on_audit();
        assert_eq!(buffer.flush(transport.as_ref()), FlushOutcome::Delivered(3));
        assert!(buffer.is_empty());
    }

    #[test]
    fn events_appended_during_successful_flush_stay_buffered() {
        let transport = Arc::new(ScriptedTransport::new());
        let buffer = Arc::new(AuditBuffer::new());
        buffer.push(event("a"));
        {
            let buffer = Arc::clone(&buffer);
            transport.on_audit(move || buffer.push(event("late")));
        }

        assert_eq!(buffer.flush(transport.as_ref()), FlushOutcome::Delivered(1));
        assert_eq!(names(&buffer.snapshot()), ["late"]);
    }

    #[test]
    fn opportunistic_flush_backs_off_after_failure() {
        let transport = ScriptedTransport::new();
        transport.fail_audit(true);
        let buffer = AuditBuffer::new();
        buffer.push(event("a"));
        let start = Instant::now();

        assert_eq!(buffer.flush_at(&transport, start, true), FlushOutcome::Requeued(1));
        let soon = start + Duration::from_millis(500);
        assert_eq!(buffer.flush_at(&transport, soon, true), FlushOutcome::Deferred);
        assert_eq!(transport.audit_calls(), 1);

        let after_first = start + INITIAL_FLUSH_BACKOFF;
        assert_eq!(buffer.flush_at(&transport, after_first, true), FlushOutcome::Requeued(1));
        let inside_doubled = after_first + INITIAL_FLUSH_BACKOFF;
        assert_eq!(buffer.flush_at(&transport, inside_doubled, true), FlushOutcome::Deferred);
        assert_eq!(transport.audit_calls(), 2);

        transport.fail_audit(false);
        let after_doubled = after_first + INITIAL_FLUSH_BACKOFF * 2;
        assert_eq!(buffer.flush_at(&transport, after_doubled, true), FlushOutcome::Delivered(1));
        buffer.push(event("b"));
        assert_eq!(buffer.flush_at(&transport, after_doubled, true), FlushOutcome::Delivered(1));
        assert_eq!(transport.audit_calls(), 4);
    }

    #[test]
    fn explicit_flush_ignores_backoff() {
        let transport = ScriptedTransport::new();
        transport.fail_audit(true);
        let buffer = AuditBuffer::new();
        buffer.push(event("a"));

        assert_eq!(buffer.flush_if_due(&transport), FlushOutcome::Requeued(1));
        assert_eq!(buffer.flush_if_due(&transport), FlushOutcome::Deferred);
        transport.fail_audit(false);
        assert_eq!(buffer.flush(&transport), FlushOutcome::Delivered(1));
        assert_eq!(transport.audit_calls(), 2);
    }

    #[test]
    fn backoff_is_capped() {
        let transport = ScriptedTransport::new();
        transport.fail_audit(true);
        let buffer = AuditBuffer::new();
        buffer.push(event("a"));
        let mut now = Instant::now();

        for _ in 0..10 {
            assert_eq!(buffer.flush_at(&transport, now, true), FlushOutcome::Requeued(1));
            now += MAX_FLUSH_BACKOFF;
        }
        assert_eq!(buffer.lock().backoff, MAX_FLUSH_BACKOFF);
    }
}
