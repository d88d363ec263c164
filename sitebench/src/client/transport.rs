use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::{Request, Response};
use crate::{
    error::Result,
    metric::{
        self, Counter, HTTP_REQ_DURATION, HTTP_REQ_FAILED, HTTP_REQS, Rate, Registry, Trend,
    },
};

/// The host's HTTP capability.
///
/// Exactly one exchange per call and no retries. Transport failures come back
/// as a [`Response`] with status `0` and `error` set, never as `Err`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> Response;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Response {
        let Request {
            method,
            url,
            body,
            options,
        } = request;

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "dropping invalid request header"),
            }
        }

        let mut builder = self.client.request(method.clone(), &url).headers(headers);
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let start = Instant::now();
        let result = match builder.send().await {
            Ok(res) => {
                let status = res.status().as_u16();
                let headers: Vec<(String, String)> = res
                    .headers()
                    .iter()
                    .filter_map(|(k, v)| {
                        Some((k.as_str().to_owned(), v.to_str().ok()?.to_owned()))
                    })
                    .collect();
                res.text().await.map(|body| (status, headers, body))
            }
            Err(e) => Err(e),
        };
        let elapsed = start.elapsed();

        match result {
            Ok((status, headers, body)) => headers
                .into_iter()
                .fold(Response::new(url, status), |r, (k, v)| r.with_header(k, v))
                .with_body(body)
                .with_duration(elapsed),
            Err(e) => {
                tracing::warn!(%method, %url, error = %e, "request failed");
                Response::failed(url, e.to_string(), elapsed)
            }
        }
    }
}

/// Wraps a transport and records the built-in HTTP metrics for every exchange.
pub struct Metered<T> {
    inner: T,
    registry: Arc<Registry>,
    reqs: Counter,
    failed: Rate,
    duration: Trend,
}

impl<T: Transport> Metered<T> {
    pub fn new(inner: T, registry: &Arc<Registry>) -> Result<Self> {
        Ok(Self {
            inner,
            registry: registry.clone(),
            reqs: registry.counter(HTTP_REQS)?,
            failed: registry.rate(HTTP_REQ_FAILED)?,
            duration: registry.trend(HTTP_REQ_DURATION)?,
        })
    }
}

#[async_trait]
impl<T: Transport> Transport for Metered<T> {
    async fn send(&self, request: Request) -> Response {
        let response = self.inner.send(request).await;
        self.reqs.add(1);
        self.failed.add(!(200..=399).contains(&response.status));
        self.duration.add(response.duration);
        // scenario tags split the duration into a sub-metric per tag set
        if let Some(tags) = metric::current_tags() {
            match self.registry.trend(&metric::tagged(HTTP_REQ_DURATION, &tags)) {
                Ok(trend) => trend.add(response.duration),
                Err(e) => tracing::warn!("Tagged duration not recorded: {e}"),
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::RequestOptions;

    struct Canned(u16);

    #[async_trait]
    impl Transport for Canned {
        async fn send(&self, request: Request) -> Response {
            Response::new(request.url, self.0).with_duration(Duration::from_millis(40))
        }
    }

    fn get(url: &str) -> Request {
        Request {
            method: reqwest::Method::GET,
            url: url.to_owned(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    #[tokio::test]
    async fn metered_records_builtins() {
        let registry = Arc::new(Registry::new());
        let ok = Metered::new(Canned(200), &registry).unwrap();
        let missing = Metered::new(Canned(404), &registry).unwrap();

        ok.send(get("http://x/")).await;
        ok.send(get("http://x/")).await;
        missing.send(get("http://x/nope")).await;

        assert_eq!(registry.counter(HTTP_REQS).unwrap().count(), 3);
        let failed = registry.rate(HTTP_REQ_FAILED).unwrap();
        assert_eq!((failed.hits(), failed.total()), (1, 3));
        assert_eq!(registry.trend(HTTP_REQ_DURATION).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn tagged_requests_feed_a_sub_metric() {
        use std::collections::BTreeMap;

        let registry = Arc::new(Registry::new());
        let ok = Metered::new(Canned(200), &registry).unwrap();
        let tags = Arc::new(BTreeMap::from([("scenario".into(), "spike".into())]));

        ok.send(get("http://x/")).await;
        metric::with_tags(tags, ok.send(get("http://x/"))).await;

        assert_eq!(registry.trend(HTTP_REQ_DURATION).unwrap().len(), 2);
        let spike = registry.trend("http_req_duration{scenario:spike}").unwrap();
        assert_eq!(spike.len(), 1);

        let raw = registry.snapshot(Duration::from_secs(1), &[]);
        let p95 = raw["http_req_duration{scenario:spike}"]["values"]["p(95)"]
            .as_f64()
            .unwrap();
        assert!((39.0..=41.0).contains(&p95), "p95 was {p95}");
    }
}
