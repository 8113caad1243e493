//! Cancellation signal shared between a client and its blocking callers.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

/// Cloneable, thread-safe cancellation flag.
///
/// Blocking waits through [`CancelToken::wait`] wake immediately once the
/// token is cancelled. Cancellation is permanent. Tokens can be linked with
/// [`CancelToken::propagate_to`] so one signal cancels several scopes, which
/// is how a single call is abandoned without touching the client-wide token.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Signal>,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<SignalState>,
    wake: Condvar,
}

#[derive(Debug, Default)]
struct SignalState {
    cancelled: bool,
    linked: Vec<Weak<Signal>>,
}

impl Signal {
    fn lock(&self) -> MutexGuard<'_, SignalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel(&self) {
        let linked = {
            let mut state = self.lock();
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            std::mem::take(&mut state.linked)
        };
        self.wake.notify_all();
        for signal in linked.iter().filter_map(Weak::upgrade) {
            signal.cancel();
        }
    }
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh token that is cancelled together with this one.
    ///
    /// Cancelling the child never cancels the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        self.propagate_to(&child);
        child
    }

    /// Cancels `other` whenever this token is cancelled, immediately if it
    /// already is. Only a weak link is kept, so dropped tokens are not retained.
    pub fn propagate_to(&self, other: &CancelToken) {
        {
            let mut state = self.inner.lock();
            if !state.cancelled {
                state.linked.retain(|signal| signal.strong_count() > 0);
                state.linked.push(Arc::downgrade(&other.inner));
                return;
            }
        }
        other.cancel();
    }

    /// Cancels the token and every linked token, waking all waiters.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns true once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Blocks for up to `timeout`, returning early if the token is cancelled.
    ///
    /// Returns true when the wait ended because of cancellation.
    #[must_use]
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.inner.lock();

        while !state.cancelled {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => Duration::MAX,
            };
            if remaining.is_zero() {
                return false;
            }
            // Spurious wakeups loop back and re-check the deadline.
            state = self
                .inner
                .wake
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}
