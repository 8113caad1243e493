//! Outbound HTTP capability and its policy-checking decorator.

use std::sync::Arc;

use async_trait::async_trait;
use gate_policy::AsyncPolicyEvaluator;
use gate_primitives::{ActionDescriptor, ActionType, Destination};
use http::Uri;
use serde_json::{Map, Value};

use crate::error::InterceptResult;
use crate::guard::enforce;

/// Outbound HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl FetchRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the method as given.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Describes the request as an `http_request` action.
    #[must_use]
    pub fn action(&self) -> ActionDescriptor {
        let headers: Map<String, Value> = self
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value.as_str())))
            .collect();
        ActionDescriptor::new(ActionType::HttpRequest, self.method.to_ascii_uppercase())
            .with_argument("url", self.url.as_str())
            .with_argument("headers", headers)
            .with_destination(destination_for(&self.url))
    }
}

/// Response returned by a fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// Derives the destination of `url`.
///
/// The port defaults to 443 for `https` and 80 otherwise. Unparseable URLs
/// keep only the raw URL.
#[must_use]
pub fn destination_for(url: &str) -> Destination {
    let mut destination = Destination {
        url: Some(url.to_owned()),
        ..Destination::default()
    };
    let Ok(uri) = url.parse::<Uri>() else {
        return destination;
    };

    let scheme = uri.scheme_str().unwrap_or_default().to_owned();
    let default_port = if scheme.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    };
    destination.port = Some(uri.port_u16().unwrap_or(default_port));
    destination.domain = uri.host().map(str::to_owned);
    destination.path = Some(uri.path().to_owned());
    destination.scheme = Some(scheme);
    destination
}

/// Capability to perform outbound HTTP requests.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Performs `request`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::InterceptError::Fetch`] when the request fails, or
    /// [`crate::InterceptError::Blocked`] from guarded fetchers.
    async fn fetch(&self, request: FetchRequest) -> InterceptResult<FetchResponse>;
}

/// Fetcher that asks the async policy evaluator before delegating.
pub struct GuardedFetcher<F> {
    inner: F,
    evaluator: Arc<dyn AsyncPolicyEvaluator>,
}

impl<F> std::fmt::Debug for GuardedFetcher<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedFetcher").finish_non_exhaustive()
    }
}

impl<F> GuardedFetcher<F>
where
    F: HttpFetcher,
{
    /// Wraps `inner` with policy enforcement.
    #[must_use]
    pub fn new(inner: F, evaluator: Arc<dyn AsyncPolicyEvaluator>) -> Self {
        Self { inner, evaluator }
    }

    /// Returns the wrapped fetcher.
    #[must_use]
    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<F> HttpFetcher for GuardedFetcher<F>
where
    F: HttpFetcher,
{
    async fn fetch(&self, request: FetchRequest) -> InterceptResult<FetchResponse> {
        let action = request.action();
        enforce(&action, self.evaluator.decide(&action).await)?;
        self.inner.fetch(request).await
    }
}
