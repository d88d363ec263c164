//! Request client: URL building, option merging, the four HTTP verbs and the
//! assertion helpers every page builds on.
//!
//! A [`RequestClient`] is created once per run and cloned into every page. It
//! owns no connection state itself; the exchange is delegated to a
//! [`Transport`].

pub mod transport;

pub use transport::{Metered, ReqwestTransport, Transport};

use std::{collections::BTreeMap, collections::HashMap, fmt, sync::Arc, time::Duration};

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::checks::Checks;

/// Latency budget of the generic response bundle.
pub const DEFAULT_LATENCY_BUDGET: Duration = Duration::from_millis(2000);

/// Per-request options.
///
/// A client holds a default instance; per-call overrides are merged over it
/// with [`RequestOptions::merged_over`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Layers `self` over `defaults`: headers merge key by key with `self`
    /// winning, every other field replaces the default when set.
    pub fn merged_over(&self, defaults: &RequestOptions) -> RequestOptions {
        let mut headers = defaults.headers.clone();
        headers.extend(self.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        RequestOptions {
            headers,
            timeout: self.timeout.or(defaults.timeout),
        }
    }
}

/// One outgoing exchange, as handed to the transport.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub options: RequestOptions,
}

/// Result of one HTTP exchange.
///
/// Header names are stored lower-cased; [`Response::header`] is the only way
/// to read them and returns `None` when the header is absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub url: String,
    /// `0` when the exchange failed before a status line was read.
    pub status: u16,
    pub body: String,
    pub duration: Duration,
    pub error: Option<String>,
    headers: HashMap<String, String>,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            ..Default::default()
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            url: url.into(),
            error: Some(error.into()),
            duration,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }
}

#[derive(Clone)]
pub struct RequestClient {
    base_url: Arc<str>,
    defaults: Arc<RequestOptions>,
    transport: Arc<dyn Transport>,
    checks: Checks,
}

impl fmt::Debug for RequestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestClient")
            .field("base_url", &self.base_url)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl RequestClient {
    pub fn new(base_url: impl AsRef<str>, transport: Arc<dyn Transport>, checks: Checks) -> Self {
        Self {
            base_url: Arc::from(base_url.as_ref()),
            defaults: Arc::new(RequestOptions::default()),
            transport,
            checks,
        }
    }

    pub fn with_defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = Arc::new(defaults);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    pub fn checks(&self) -> &Checks {
        &self.checks
    }

    /// Absolute URLs pass through; paths are joined to the base URL with
    /// exactly one separating slash.
    pub fn build_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_owned();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        format!("{base}/{path}")
    }

    pub fn merge_options(&self, overrides: Option<&RequestOptions>) -> RequestOptions {
        match overrides {
            Some(o) => o.merged_over(&self.defaults),
            None => (*self.defaults).clone(),
        }
    }

    pub async fn get(&self, endpoint: &str, options: Option<RequestOptions>) -> Response {
        self.send(Method::GET, endpoint, None, options).await
    }

    pub async fn post(
        &self,
        endpoint: &str,
        body: Option<String>,
        options: Option<RequestOptions>,
    ) -> Response {
        self.send(Method::POST, endpoint, body, options).await
    }

    pub async fn put(
        &self,
        endpoint: &str,
        body: Option<String>,
        options: Option<RequestOptions>,
    ) -> Response {
        self.send(Method::PUT, endpoint, body, options).await
    }

    pub async fn delete(&self, endpoint: &str, options: Option<RequestOptions>) -> Response {
        self.send(Method::DELETE, endpoint, None, options).await
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<String>,
        options: Option<RequestOptions>,
    ) -> Response {
        let request = Request {
            method,
            url: self.build_url(endpoint),
            body,
            options: self.merge_options(options.as_ref()),
        };
        self.transport.send(request).await
    }

    pub fn assert_status(&self, response: &Response, expected: u16) -> bool {
        self.checks
            .record(&format!("status is {expected}"), response.status == expected)
    }

    pub fn assert_latency_under(&self, response: &Response, max: Duration) -> bool {
        self.checks.record(
            &format!("response time < {}ms", max.as_millis()),
            response.duration < max,
        )
    }

    pub fn assert_body_contains(&self, response: &Response, text: &str) -> bool {
        self.checks.record(
            &format!("body contains \"{text}\""),
            response.body.contains(text),
        )
    }

    /// Generic bundle: expected status, 2s latency budget, non-empty body.
    pub fn check_response(&self, response: &Response, expected: u16, label: &str) -> bool {
        self.checks.check([
            (
                format!("{label}: status is {expected}"),
                response.status == expected,
            ),
            (
                format!(
                    "{label}: response time < {}ms",
                    DEFAULT_LATENCY_BUDGET.as_millis()
                ),
                response.duration < DEFAULT_LATENCY_BUDGET,
            ),
            (format!("{label}: has body"), response.has_body()),
        ])
    }

    /// Like [`check_response`](Self::check_response) but accepting any of
    /// `statuses`, without the body check.
    pub fn check_statuses(&self, response: &Response, statuses: &[u16], label: &str) -> bool {
        self.checks.check([
            (
                format!("{label}: status is valid"),
                statuses.contains(&response.status),
            ),
            (
                format!(
                    "{label}: response time < {}ms",
                    DEFAULT_LATENCY_BUDGET.as_millis()
                ),
                response.duration < DEFAULT_LATENCY_BUDGET,
            ),
        ])
    }
}
