//! Async wrapper over the blocking client.

use std::sync::Arc;

use async_trait::async_trait;
use gate_primitives::{ActionDescriptor, Decision};
use tokio::task;
use tracing::debug;

use crate::audit::FlushOutcome;
use crate::cancel::CancelToken;
use crate::client::{EvaluateOptions, PolicyClient};
use crate::error::{GateError, GateResult};

/// Async decision surface consumed by adapters running on an executor.
#[async_trait]
pub trait AsyncPolicyEvaluator: Send + Sync {
    /// Evaluates `action` without raising on deny.
    ///
    /// # Errors
    ///
    /// Same as [`crate::PolicyEvaluator::decide`], plus
    /// [`GateError::Bridge`] when the blocking call could not complete.
    async fn decide(&self, action: &ActionDescriptor) -> GateResult<Decision>;
}

/// Runs [`PolicyClient`] calls on the `tokio` blocking pool.
///
/// The blocking contract is unchanged: each call still performs the same
/// network round trips and approval polling, it just never stalls an async
/// worker thread. Dropping an evaluate future cancels its approval wait.
#[derive(Debug, Clone)]
pub struct AsyncPolicyClient {
    inner: Arc<PolicyClient>,
}

impl AsyncPolicyClient {
    /// Wraps a client.
    #[must_use]
    pub fn new(client: PolicyClient) -> Self {
        Self::from_shared(Arc::new(client))
    }

    /// Wraps a client that is also used from blocking call sites.
    #[must_use]
    pub const fn from_shared(inner: Arc<PolicyClient>) -> Self {
        Self { inner }
    }

    /// Returns the underlying blocking client.
    #[must_use]
    pub fn blocking(&self) -> &Arc<PolicyClient> {
        &self.inner
    }

    /// Async form of [`PolicyClient::evaluate`].
    ///
    /// # Errors
    ///
    /// See [`PolicyClient::evaluate_with`]; [`GateError::Bridge`] when the
    /// blocking task panicked or was cancelled.
    pub async fn evaluate(&self, action: &ActionDescriptor) -> GateResult<Decision> {
        self.evaluate_with(action, EvaluateOptions::default()).await
    }

    /// Async form of [`PolicyClient::evaluate_with`].
    ///
    /// A token passed through [`EvaluateOptions::with_cancel`] still applies.
    ///
    /// # Errors
    ///
    /// See [`AsyncPolicyClient::evaluate`].
    pub async fn evaluate_with(
        &self,
        action: &ActionDescriptor,
        options: EvaluateOptions,
    ) -> GateResult<Decision> {
        let call = CancelToken::new();
        if let Some(caller) = options.cancel_token() {
            caller.propagate_to(&call);
        }
        let options = options.with_cancel(call.clone());
        let _guard = CancelOnDrop(call);

        let client = Arc::clone(&self.inner);
        let action = action.clone();
        task::spawn_blocking(move || client.evaluate_with(&action, &options))
            .await
            .map_err(|err| GateError::bridge(err.to_string()))?
    }

    /// Async form of [`PolicyClient::check`]. Never fails.
    pub async fn check(&self, action: &ActionDescriptor) -> bool {
        let client = Arc::clone(&self.inner);
        let action = action.clone();
        match task::spawn_blocking(move || client.check(&action)).await {
            Ok(permitted) => permitted,
            Err(err) => {
                debug!(%err, "check bridge failed, permitting");
                true
            }
        }
    }

    /// Async form of [`PolicyClient::flush_audit`].
    pub async fn flush_audit(&self) -> FlushOutcome {
        let client = Arc::clone(&self.inner);
        task::spawn_blocking(move || client.flush_audit())
            .await
            .unwrap_or(FlushOutcome::Empty)
    }
}

/// Cancels the blocking call when its async caller goes away.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[async_trait]
impl AsyncPolicyEvaluator for AsyncPolicyClient {
    async fn decide(&self, action: &ActionDescriptor) -> GateResult<Decision> {
        self.evaluate_with(action, EvaluateOptions::non_raising()).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use gate_config::{FailMode, GateConfig};
    use gate_primitives::{ActionType, Outcome};
    use gate_transport::PolicyTransport;

    use super::*;
    use crate::testing::ScriptedTransport;

    fn async_client(config: GateConfig) -> (AsyncPolicyClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let client = PolicyClient::with_transport(
            config,
            Arc::clone(&transport) as Arc<dyn PolicyTransport>,
        );
        (AsyncPolicyClient::new(client), transport)
    }

    fn fetch() -> ActionDescriptor {
        ActionDescriptor::new(ActionType::HttpRequest, "GET")
            .with_argument("url", "https://example.com/")
    }

    #[tokio::test]
    async fn evaluate_raises_deny() {
        let (client, transport) = async_client(GateConfig::default());
        transport.push_decision(Decision::new(Outcome::Deny).with_rule("rule-1", "no-egress"));

        let err = client.evaluate(&fetch()).await.unwrap_err();
        assert_eq!(err.denial().map(|d| d.rule_id.as_str()), Some("rule-1"));
    }

    #[tokio::test]
    async fn decide_returns_deny_decision() {
        let (client, transport) = async_client(GateConfig::default());
        transport.push_decision(Decision::new(Outcome::Deny));

        let evaluator: &dyn AsyncPolicyEvaluator = &client;
        assert!(evaluator.decide(&fetch()).await.unwrap().is_deny());
    }

    #[tokio::test]
    async fn check_permits_on_fail_closed_transport_error() {
        let (client, transport) =
            async_client(GateConfig::default().with_fail_mode(FailMode::Closed));

        assert!(client.check(&fetch()).await);
        assert!(matches!(
            client.evaluate(&fetch()).await,
            Err(GateError::ServerUnreachable { .. })
        ));
        assert_eq!(transport.evaluate_calls(), 2);
        assert_eq!(client.blocking().pending_audit_events(), 2);
        assert_eq!(client.flush_audit().await, FlushOutcome::Delivered(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shares_cache_with_blocking_client() {
        let (client, transport) = async_client(GateConfig::default());
        transport.push_decision(Decision::new(Outcome::Allow));

        assert!(client.evaluate(&fetch()).await.unwrap().is_allow());
        assert!(client.blocking().evaluate(&fetch()).unwrap().is_allow());
        assert_eq!(transport.evaluate_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn abandoned_evaluate_stops_polling() {
        let config = GateConfig::default()
            .with_approval_polling(Duration::from_millis(20), 30)
            .unwrap();
        let (client, transport) = async_client(config);
        transport.push_decision(
            Decision::new(Outcome::ApprovalRequired).with_request_id("req-1"),
        );

        let abandoned =
            tokio::time::timeout(Duration::from_millis(60), client.evaluate(&fetch())).await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = transport.status_calls();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(transport.status_calls(), settled);
        assert!(settled < 10, "polled {settled} times after abandoning");
        assert!(!client.blocking().cancel_token().is_cancelled());
    }

    #[tokio::test]
    async fn caller_token_cancels_async_evaluate() {
        let (client, transport) = async_client(GateConfig::default());
        transport.push_decision(
            Decision::new(Outcome::ApprovalRequired).with_request_id("req-1"),
        );
        let caller = CancelToken::new();
        caller.cancel();

        let decision = client
            .evaluate_with(&fetch(), EvaluateOptions::non_raising().with_cancel(caller))
            .await
            .unwrap();

        assert!(decision.is_deny());
        assert_eq!(transport.status_calls(), 0);
    }
}
