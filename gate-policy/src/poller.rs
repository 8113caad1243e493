//! Polling loop that waits for a human reviewer to resolve a pending decision.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use gate_primitives::{Decision, Outcome};
use gate_transport::{ApprovalStatus, PolicyTransport, ReviewState};
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;

/// Reason recorded on a decision approved by a reviewer.
pub const APPROVED_REASON: &str = "approved";
/// Reason recorded when a reviewer denies without giving one.
pub const REVIEWER_DENIED_REASON: &str = "denied by reviewer";
/// Reason recorded when polling is cancelled.
pub const CANCELLED_REASON: &str = "approval cancelled";

/// How a single pause between attempts ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    /// The full interval elapsed.
    Elapsed,
    /// The cancellation token fired during the wait.
    Cancelled,
}

/// Waits between approval status attempts.
pub trait Pacer: Send + Sync {
    /// Blocks for `interval`, returning early when `cancel` fires.
    fn pause(&self, interval: Duration, cancel: &CancelToken) -> Pause;
}

/// [`Pacer`] that blocks the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPacer;

impl Pacer for ThreadPacer {
    fn pause(&self, interval: Duration, cancel: &CancelToken) -> Pause {
        if cancel.wait(interval) {
            Pause::Cancelled
        } else {
            Pause::Elapsed
        }
    }
}

/// Terminal state reached by [`ApprovalPoller::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// A reviewer approved the action.
    Approved(Decision),
    /// A reviewer denied the action.
    Denied(Decision),
    /// The attempt budget ran out without a terminal status.
    TimedOut(Decision),
    /// The cancellation token fired before a terminal status arrived.
    Cancelled(Decision),
}

impl ApprovalOutcome {
    /// Returns the decision describing this outcome.
    #[must_use]
    pub fn decision(&self) -> &Decision {
        match self {
            Self::Approved(decision)
            | Self::Denied(decision)
            | Self::TimedOut(decision)
            | Self::Cancelled(decision) => decision,
        }
    }

    /// Consumes the outcome, returning its decision.
    #[must_use]
    pub fn into_decision(self) -> Decision {
        match self {
            Self::Approved(decision)
            | Self::Denied(decision)
            | Self::TimedOut(decision)
            | Self::Cancelled(decision) => decision,
        }
    }
}

/// Bounded status poller for approval-required decisions.
///
/// One pause precedes every status request. Transport errors are logged and
/// consume an attempt. An exhausted budget resolves to a deny.
pub struct ApprovalPoller {
    transport: Arc<dyn PolicyTransport>,
    pacer: Arc<dyn Pacer>,
    interval: Duration,
    max_attempts: NonZeroU32,
}

impl std::fmt::Debug for ApprovalPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalPoller")
            .field("interval", &self.interval)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ApprovalPoller {
    /// Creates a poller with the given budget.
    #[must_use]
    pub fn new(
        transport: Arc<dyn PolicyTransport>,
        pacer: Arc<dyn Pacer>,
        interval: Duration,
        max_attempts: NonZeroU32,
    ) -> Self {
        Self {
            transport,
            pacer,
            interval,
            max_attempts,
        }
    }

    /// Returns the worst-case polling window.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts.get())
    }

    /// Polls until `pending` resolves, the budget runs out, or `cancel` fires.
    pub fn poll(&self, pending: &Decision, cancel: &CancelToken) -> ApprovalOutcome {
        let request_id = pending.request_id();
        info!(request_id, "waiting for approval");

        for attempt in 1..=self.max_attempts.get() {
            if cancel.is_cancelled()
                || self.pacer.pause(self.interval, cancel) == Pause::Cancelled
            {
                debug!(request_id, attempt, "approval polling cancelled");
                return ApprovalOutcome::Cancelled(resolved_deny(pending, CANCELLED_REASON));
            }

            match self.transport.status(request_id) {
                Ok(ApprovalStatus {
                    state: ReviewState::Approved,
                    ..
                }) => {
                    info!(request_id, attempt, "approval granted");
                    return ApprovalOutcome::Approved(
                        Decision::new(Outcome::Allow)
                            .with_rule(pending.rule_id(), pending.rule_name())
                            .with_reason(APPROVED_REASON)
                            .with_request_id(request_id),
                    );
                }
                Ok(ApprovalStatus {
                    state: ReviewState::Denied,
                    reason,
                    ..
                }) => {
                    let reason = reason.unwrap_or_else(|| REVIEWER_DENIED_REASON.to_owned());
                    info!(request_id, attempt, reason = %reason, "approval denied");
                    return ApprovalOutcome::Denied(resolved_deny(pending, reason));
                }
                Ok(_) => debug!(request_id, attempt, "approval still pending"),
                Err(error) => warn!(request_id, attempt, %error, "approval status poll failed"),
            }
        }

        let reason = format!("approval timeout after {}s", self.budget().as_secs_f64());
        warn!(request_id, reason = %reason, "approval polling exhausted");
        ApprovalOutcome::TimedOut(resolved_deny(pending, reason))
    }
}

fn resolved_deny(pending: &Decision, reason: impl Into<String>) -> Decision {
    Decision::new(Outcome::Deny)
        .with_rule(pending.rule_id(), pending.rule_name())
        .with_reason(reason)
        .with_help(pending.help_url(), pending.help_text())
        .with_request_id(pending.request_id())
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::testing::{CountingPacer, ScriptedTransport};

    fn pending() -> Decision {
        Decision::new(Outcome::ApprovalRequired)
            .with_rule("rule-7", "needs-review")
            .with_reason("sensitive")
            .with_help("https://docs.example/review", "Ask your lead")
            .with_request_id("req-1")
    }

    fn poller(
        transport: &Arc<ScriptedTransport>,
        pacer: &Arc<CountingPacer>,
        attempts: u32,
    ) -> ApprovalPoller {
        ApprovalPoller::new(
            Arc::clone(transport) as Arc<dyn PolicyTransport>,
            Arc::clone(pacer) as Arc<dyn Pacer>,
            Duration::from_secs(2),
            NonZeroU32::new(attempts).unwrap(),
        )
    }

    #[test]
    fn approval_after_pending_poll() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(Ok(ReviewState::Pending));
        transport.push_status(Ok(ReviewState::Approved));
        let pacer = Arc::new(CountingPacer::new());

        let outcome = poller(&transport, &pacer, 30).poll(&pending(), &CancelToken::new());

        let ApprovalOutcome::Approved(decision) = outcome else {
            panic!("expected approval, got {outcome:?}");
        };
        assert!(decision.is_allow());
        assert_eq!(decision.reason(), "approved");
        assert_eq!(decision.rule_id(), "rule-7");
        assert_eq!(decision.rule_name(), "needs-review");
        assert_eq!(pacer.waits(), 2);
        assert_eq!(transport.status_calls(), 2);
    }

    #[test]
    fn reviewer_denial_inherits_help_text() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status_with_reason(ReviewState::Denied, "not today");
        let pacer = Arc::new(CountingPacer::new());

        let outcome = poller(&transport, &pacer, 30).poll(&pending(), &CancelToken::new());

        let ApprovalOutcome::Denied(decision) = outcome else {
            panic!("expected denial, got {outcome:?}");
        };
        assert_eq!(decision.reason(), "not today");
        assert_eq!(decision.help_text(), "Ask your lead");
        assert_eq!(decision.help_url(), "https://docs.example/review");
        assert_eq!(pacer.waits(), 1);
    }

    #[test]
    fn reviewer_denial_without_reason_uses_default() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(Ok(ReviewState::Denied));
        let pacer = Arc::new(CountingPacer::new());

        let outcome = poller(&transport, &pacer, 30).poll(&pending(), &CancelToken::new());
        assert_eq!(outcome.decision().reason(), "denied by reviewer");
        assert!(outcome.decision().is_deny());
    }

    #[test]
    fn exhausted_budget_times_out_closed() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..30 {
            transport.push_status(Ok(ReviewState::Pending));
        }
        let pacer = Arc::new(CountingPacer::new());

        let outcome = poller(&transport, &pacer, 30).poll(&pending(), &CancelToken::new());

        let ApprovalOutcome::TimedOut(decision) = outcome else {
            panic!("expected timeout, got {outcome:?}");
        };
        assert!(decision.is_deny());
        assert_eq!(decision.reason(), "approval timeout after 60s");
        assert_eq!(pacer.waits(), 30);
        assert_eq!(transport.status_calls(), 30);
    }

    #[test]
    fn transport_errors_consume_attempts() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(Err(()));
        transport.push_status(Err(()));
        transport.push_status(Ok(ReviewState::Approved));
        let pacer = Arc::new(CountingPacer::new());

        let outcome = poller(&transport, &pacer, 3).poll(&pending(), &CancelToken::new());
        assert!(matches!(outcome, ApprovalOutcome::Approved(_)));
        assert_eq!(transport.status_calls(), 3);

        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.push_status(Err(()));
        }
        let pacer = Arc::new(CountingPacer::new());
        let outcome = poller(&transport, &pacer, 3).poll(&pending(), &CancelToken::new());
        assert!(matches!(outcome, ApprovalOutcome::TimedOut(_)));
        assert_eq!(transport.status_calls(), 3);
    }

    #[test]
    fn cancelled_token_stops_before_polling() {
        let transport = Arc::new(ScriptedTransport::new());
        let pacer = Arc::new(CountingPacer::new());
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = poller(&transport, &pacer, 30).poll(&pending(), &cancel);

        let ApprovalOutcome::Cancelled(decision) = outcome else {
            panic!("expected cancellation, got {outcome:?}");
        };
        assert!(decision.is_deny());
        assert_eq!(decision.reason(), "approval cancelled");
        assert_eq!(pacer.waits(), 0);
        assert_eq!(transport.status_calls(), 0);
    }

    #[test]
    fn thread_pacer_wakes_on_cancel() {
        let transport = Arc::new(ScriptedTransport::new());
        let poller = ApprovalPoller::new(
            Arc::clone(&transport) as Arc<dyn PolicyTransport>,
            Arc::new(ThreadPacer),
            Duration::from_secs(30),
            NonZeroU32::new(30).unwrap(),
        );
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = poller.poll(&pending(), &cancel);
        canceller.join().unwrap();

        assert!(matches!(outcome, ApprovalOutcome::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(transport.status_calls(), 0);
    }
}
