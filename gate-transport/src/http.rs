//! `hyper`-backed transport.

use std::fmt;
use std::time::Duration;

use futures::executor::block_on;
use gate_config::GateConfig;
use gate_primitives::{AuditEvent, Decision};
use hyper::body::{Bytes, to_bytes};
use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Method, Request, Uri};
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::error::{TransportError, TransportResult};
use crate::http_client::{HyperClient, build_https_client};
use crate::wire::{ApprovalStatus, AuditBatch, EvaluateRequest, EvaluateResponse, StatusResponse};
use crate::{AUDIT_PATH, EVALUATE_PATH, PolicyTransport, status_path};

/// Blocking HTTP/HTTPS transport.
///
/// Requests run on a small private `tokio` runtime and the calling thread
/// waits for the result, so the transport can be used from plain threads,
/// from `spawn_blocking` sections, and concurrently from many call sites.
pub struct HttpTransport {
    client: HyperClient,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    handle: Handle,
    _runtime: BackgroundRuntime,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("authenticated", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Builds a transport from the client configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Configuration`] if the server address cannot be
    /// parsed or the background runtime cannot be started.
    pub fn new(config: &GateConfig) -> TransportResult<Self> {
        let base_url = config.server_addr().trim_end_matches('/').to_owned();
        base_url.parse::<Uri>().map_err(|err| {
            TransportError::configuration(format!("invalid server address `{base_url}`: {err}"))
        })?;

        let runtime = BackgroundRuntime::start()?;
        let handle = runtime.handle()?;

        Ok(Self {
            client: build_https_client(config.timeout()),
            base_url,
            api_key: config.api_key().map(str::to_owned),
            timeout: config.timeout(),
            handle,
            _runtime: runtime,
        })
    }

    /// Returns the base address requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> TransportResult<Bytes> {
        let uri = format!("{}{path}", self.base_url)
            .parse::<Uri>()
            .map_err(|err| {
                TransportError::configuration(format!("invalid request uri: {err}"))
            })?;

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(ACCEPT, "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {key}"));
        }
        let body = match body {
            Some(bytes) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                Body::from(bytes)
            }
            None => Body::empty(),
        };
        let request = builder.body(body).map_err(|err| {
            TransportError::configuration(format!("failed to build request: {err}"))
        })?;

        let client = self.client.clone();
        let limit = self.timeout;
        trace!(%method, path, "sending request to decision service");

        let exchange = async move {
            let response = client
                .request(request)
                .await
                .map_err(|err| TransportError::connect(err.to_string()))?;
            let status = response.status();
            let bytes = to_bytes(response.into_body()).await.map_err(|err| {
                TransportError::connect(format!("failed to read response body: {err}"))
            })?;

            if !status.is_success() {
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body: String::from_utf8_lossy(&bytes).into_owned(),
                });
            }
            Ok::<_, TransportError>(bytes)
        };
        let task = self.handle.spawn(async move {
            match timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout { after: limit }),
            }
        });

        block_on(task)
            .map_err(|err| TransportError::connect(format!("transport task aborted: {err}")))?
    }
}

impl PolicyTransport for HttpTransport {
    fn evaluate(&self, request: &EvaluateRequest) -> TransportResult<Decision> {
        let body = serde_json::to_vec(request).map_err(|err| {
            TransportError::configuration(format!("failed to encode evaluation request: {err}"))
        })?;
        let bytes = self.exchange(Method::POST, EVALUATE_PATH, Some(body))?;
        let decision = EvaluateResponse::from_slice(&bytes)?.into_decision()?;
        debug!(
            action_type = %request.action_type(),
            action_name = request.action_name(),
            outcome = %decision.outcome(),
            "decision service answered"
        );
        Ok(decision)
    }

    fn status(&self, request_id: &str) -> TransportResult<ApprovalStatus> {
        let bytes = self.exchange(Method::GET, &status_path(request_id)?, None)?;
        Ok(StatusResponse::from_slice(&bytes)?.into_status())
    }

    fn submit_audit(&self, events: &[AuditEvent]) -> TransportResult<()> {
        let body = serde_json::to_vec(&AuditBatch::new(events)).map_err(|err| {
            TransportError::configuration(format!("failed to encode audit batch: {err}"))
        })?;
        self.exchange(Method::POST, AUDIT_PATH, Some(body))?;
        Ok(())
    }
}

/// Owns the transport runtime and shuts it down without blocking on drop, so
/// a transport may be dropped from inside an async context.
struct BackgroundRuntime(Option<Runtime>);

impl BackgroundRuntime {
    fn start() -> TransportResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("policy-gate-io")
            .enable_all()
            .build()
            .map_err(|err| {
                TransportError::configuration(format!("failed to start transport runtime: {err}"))
            })?;
        Ok(Self(Some(runtime)))
    }

    fn handle(&self) -> TransportResult<Handle> {
        self.0
            .as_ref()
            .map(|runtime| runtime.handle().clone())
            .ok_or_else(|| TransportError::configuration("transport runtime already stopped"))
    }
}

impl Drop for BackgroundRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}
