use std::fmt;
use std::sync::Arc;

use gate_config::{FailMode, GateConfig};
use gate_primitives::{ActionDescriptor, AuditEvent, Decision, Identity, Outcome};
use gate_transport::{EvaluateRequest, HttpTransport, PolicyTransport, TransportError};
use tracing::{debug, error, warn};

use crate::audit::{AuditBuffer, FlushOutcome};
use crate::cache::DecisionCache;
use crate::cancel::CancelToken;
use crate::error::{GateError, GateResult};
use crate::poller::{ApprovalOutcome, ApprovalPoller, Pacer, ThreadPacer};

/// Per-call overrides for [`PolicyClient::evaluate_with`].
///
/// Unset fields fall back to the client configuration. Overriding the
/// identity, protocol or framework with a value other than the configured
/// one bypasses the decision cache, since cached allows are not keyed on them.
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    identity: Option<Identity>,
    protocol: Option<String>,
    framework: Option<String>,
    raise_on_deny: bool,
    cancel: Option<CancelToken>,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            identity: None,
            protocol: None,
            framework: None,
            raise_on_deny: true,
            cancel: None,
        }
    }
}

impl EvaluateOptions {
    /// Options that raise [`GateError::PolicyDenied`] on a deny.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options that return deny decisions instead of raising.
    #[must_use]
    pub fn non_raising() -> Self {
        Self::default().with_raise_on_deny(false)
    }

    /// Evaluates on behalf of `identity`.
    ///
    /// Unless `identity` equals the configured one, the call neither reads
    /// nor fills the decision cache.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Overrides the protocol tag.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Overrides the framework tag.
    #[must_use]
    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }

    /// Controls whether deny outcomes are raised as errors.
    #[must_use]
    pub const fn with_raise_on_deny(mut self, raise_on_deny: bool) -> Self {
        self.raise_on_deny = raise_on_deny;
        self
    }

    /// Stops approval polling for this call once `cancel` fires.
    ///
    /// The client-wide token still applies; cancelling this one leaves the
    /// client and other calls untouched.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Returns whether deny outcomes are raised as errors.
    #[must_use]
    pub const fn raise_on_deny(&self) -> bool {
        self.raise_on_deny
    }

    /// Returns the per-call cancellation token, if any.
    #[must_use]
    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }
}

/// Decision surface consumed by interception adapters.
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluates `action` without raising on deny.
    ///
    /// # Errors
    ///
    /// Returns a [`GateError`] when no decision can be produced, for example
    /// [`GateError::ServerUnreachable`] in fail-closed mode.
    fn decide(&self, action: &ActionDescriptor) -> GateResult<Decision>;
}

impl<T> PolicyEvaluator for Arc<T>
where
    T: PolicyEvaluator + ?Sized,
{
    fn decide(&self, action: &ActionDescriptor) -> GateResult<Decision> {
        (**self).decide(action)
    }
}

/// Blocking policy decision client.
///
/// Safe to share between threads. Evaluation consults the decision cache,
/// then the server, then the approval poller when a reviewer must decide.
/// When the server cannot produce a decision the configured [`FailMode`]
/// resolves the action locally and an audit event is buffered.
pub struct PolicyClient {
    config: GateConfig,
    transport: Arc<dyn PolicyTransport>,
    cache: DecisionCache,
    audit: AuditBuffer,
    poller: ApprovalPoller,
    cancel: CancelToken,
}

impl fmt::Debug for PolicyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyClient")
            .field("server_addr", &self.config.server_addr())
            .field("fail_mode", &self.config.fail_mode())
            .field("cache_len", &self.cache.len())
            .field("pending_audit_events", &self.audit.len())
            .finish_non_exhaustive()
    }
}

impl PolicyClient {
    /// Builds a client talking HTTP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Configuration`] if the transport cannot be built.
    pub fn new(config: GateConfig) -> GateResult<Self> {
        let transport = HttpTransport::new(&config)
            .map_err(|err| GateError::configuration(err.to_string()))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Builds a client from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Configuration`] if the transport cannot be built.
    pub fn from_env() -> GateResult<Self> {
        Self::new(GateConfig::from_env())
    }

    /// Builds a client over an existing transport.
    #[must_use]
    pub fn with_transport(config: GateConfig, transport: Arc<dyn PolicyTransport>) -> Self {
        let poller = ApprovalPoller::new(
            Arc::clone(&transport),
            Arc::new(ThreadPacer),
            config.approval_interval(),
            config.approval_max_attempts(),
        );
        Self {
            cache: DecisionCache::new(config.cache_max_size(), config.cache_ttl()),
            audit: AuditBuffer::new(),
            cancel: CancelToken::new(),
            poller,
            transport,
            config,
        }
    }

    /// Replaces the pacer used between approval status attempts.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.poller = ApprovalPoller::new(
            Arc::clone(&self.transport),
            pacer,
            self.config.approval_interval(),
            self.config.approval_max_attempts(),
        );
        self
    }

    /// Returns the client configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Returns the client-wide token that interrupts approval polling.
    ///
    /// Cancelling it is permanent and stops every current and future approval
    /// wait on this client. Use [`EvaluateOptions::with_cancel`] to abandon a
    /// single call.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns the number of cached decisions.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Returns the number of audit events awaiting delivery.
    #[must_use]
    pub fn pending_audit_events(&self) -> usize {
        self.audit.len()
    }

    /// Evaluates `action`, raising on deny.
    ///
    /// # Errors
    ///
    /// See [`PolicyClient::evaluate_with`].
    pub fn evaluate(&self, action: &ActionDescriptor) -> GateResult<Decision> {
        self.evaluate_with(action, &EvaluateOptions::default())
    }

    /// Evaluates `action` with per-call overrides.
    ///
    /// Returns the decision for allow outcomes and for approval-required
    /// responses that carry no request id.
    ///
    /// # Errors
    ///
    /// With `raise_on_deny` set: [`GateError::PolicyDenied`] on a server or
    /// reviewer deny, [`GateError::ApprovalTimeout`] when the approval budget
    /// is exhausted, [`GateError::ApprovalCancelled`] when polling is
    /// cancelled. Regardless of options: [`GateError::ServerUnreachable`] when
    /// the server produced no decision and the client runs fail-closed.
    pub fn evaluate_with(
        &self,
        action: &ActionDescriptor,
        options: &EvaluateOptions,
    ) -> GateResult<Decision> {
        let key = self.uses_cached_scope(options).then(|| action.cache_key());
        if let Some(cached) = key.as_ref().and_then(|key| self.cache.get(key)) {
            debug!(
                action_type = %action.action_type(),
                action_name = action.action_name(),
                "cached policy decision"
            );
            return Ok(cached);
        }

        let request = self.request_for(action, options);
        let decision = match self.transport.evaluate(&request) {
            Ok(decision) => decision,
            Err(err) => return self.fail_locally(action, &err),
        };
        debug!(
            action_type = %action.action_type(),
            action_name = action.action_name(),
            decision = %decision.outcome(),
            rule_id = decision.rule_id(),
            latency_ms = decision.latency_ms(),
            "policy decision"
        );

        // The server answered, so anything buffered while it was down can go now.
        if !self.audit.is_empty() {
            self.audit.flush_if_due(self.transport.as_ref());
        }

        match decision.outcome() {
            Outcome::Allow => {
                if let Some(key) = key {
                    self.cache.put(key, decision.clone());
                }
                Ok(decision)
            }
            Outcome::Deny => Self::deny(decision, options.raise_on_deny),
            Outcome::ApprovalRequired if !decision.is_pollable() => {
                debug!(
                    action_name = action.action_name(),
                    "approval required without request id, leaving undecided"
                );
                Ok(decision)
            }
            Outcome::ApprovalRequired => self.await_approval(&decision, options),
        }
    }

    /// Returns false only when the action is denied.
    ///
    /// Never raises: every error, including fail-closed transport failures,
    /// permits the action.
    #[must_use]
    pub fn check(&self, action: &ActionDescriptor) -> bool {
        self.check_with(action, EvaluateOptions::default())
    }

    /// [`PolicyClient::check`] with per-call overrides. `raise_on_deny` is ignored.
    #[must_use]
    pub fn check_with(&self, action: &ActionDescriptor, options: EvaluateOptions) -> bool {
        match self.evaluate_with(action, &options.with_raise_on_deny(false)) {
            Ok(decision) => !decision.is_deny(),
            Err(err) => {
                debug!(action_name = action.action_name(), %err, "check swallowed error");
                true
            }
        }
    }

    /// Attempts to deliver buffered audit events. Failures stay buffered.
    pub fn flush_audit(&self) -> FlushOutcome {
        self.audit.flush(self.transport.as_ref())
    }

    /// Interrupts approval polling and performs a final audit flush.
    pub fn shutdown(&self) -> FlushOutcome {
        self.cancel.cancel();
        self.flush_audit()
    }

    fn request_for(&self, action: &ActionDescriptor, options: &EvaluateOptions) -> EvaluateRequest {
        let identity = options
            .identity
            .as_ref()
            .unwrap_or_else(|| self.config.identity());
        let protocol = options
            .protocol
            .as_deref()
            .unwrap_or_else(|| self.config.protocol());
        let framework = options
            .framework
            .clone()
            .or_else(|| self.config.framework().map(str::to_owned));
        EvaluateRequest::new(action, identity, protocol, framework)
    }

    fn uses_cached_scope(&self, options: &EvaluateOptions) -> bool {
        options
            .identity
            .as_ref()
            .is_none_or(|identity| identity == self.config.identity())
            && options
                .protocol
                .as_deref()
                .is_none_or(|protocol| protocol == self.config.protocol())
            && options
                .framework
                .as_deref()
                .is_none_or(|framework| Some(framework) == self.config.framework())
    }

    fn await_approval(
        &self,
        pending: &Decision,
        options: &EvaluateOptions,
    ) -> GateResult<Decision> {
        let raise_on_deny = options.raise_on_deny;
        let scope = self.cancel.child();
        if let Some(call) = &options.cancel {
            call.propagate_to(&scope);
        }
        match self.poller.poll(pending, &scope) {
            ApprovalOutcome::Approved(decision) => Ok(decision),
            ApprovalOutcome::Denied(decision) => Self::deny(decision, raise_on_deny),
            ApprovalOutcome::TimedOut(_) if raise_on_deny => Err(GateError::ApprovalTimeout {
                request_id: pending.request_id().to_owned(),
                waited: self.poller.budget(),
            }),
            ApprovalOutcome::Cancelled(_) if raise_on_deny => Err(GateError::ApprovalCancelled {
                request_id: pending.request_id().to_owned(),
            }),
            ApprovalOutcome::TimedOut(decision) | ApprovalOutcome::Cancelled(decision) => {
                Ok(decision)
            }
        }
    }

    fn deny(decision: Decision, raise_on_deny: bool) -> GateResult<Decision> {
        if raise_on_deny {
            Err(GateError::denied(&decision))
        } else {
            Ok(decision)
        }
    }

    fn fail_locally(
        &self,
        action: &ActionDescriptor,
        err: &TransportError,
    ) -> GateResult<Decision> {
        match self.config.fail_mode() {
            FailMode::Closed => {
                let decision =
                    Decision::new(Outcome::Deny).with_reason(Decision::FAIL_CLOSED_REASON);
                self.record_audit(action, &decision);
                error!(
                    action_type = %action.action_type(),
                    action_name = action.action_name(),
                    error = %err,
                    "policy evaluation failed, blocking action"
                );
                Err(GateError::unreachable(err.to_string()))
            }
            FailMode::Open => {
                let decision = Decision::fail_open();
                self.record_audit(action, &decision);
                warn!(
                    action_type = %action.action_type(),
                    action_name = action.action_name(),
                    error = %err,
                    "policy evaluation failed, allowing action"
                );
                Ok(decision)
            }
        }
    }

    fn record_audit(&self, action: &ActionDescriptor, decision: &Decision) {
        self.audit
            .push(AuditEvent::record(action, decision, self.config.agent_id()));
    }
}

impl PolicyEvaluator for PolicyClient {
    fn decide(&self, action: &ActionDescriptor) -> GateResult<Decision> {
        self.evaluate_with(action, &EvaluateOptions::non_raising())
    }
}
