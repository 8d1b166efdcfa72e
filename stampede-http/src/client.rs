use bytes::Bytes;
use http_body_util::{BodyExt as _, Full};
use hyper::Request;
use hyper::Uri;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use super::{Error, HttpRequest, OutcomeStatus, RequestOutcome, Result};

#[derive(Debug, Clone, Copy)]
struct ConnectSample {
    started: Instant,
    elapsed: Duration,
}

/// Slot the connector writes into when it establishes a fresh connection.
///
/// One slot per client, and each client is driven by exactly one virtual
/// user at a time, so the last sample written always belongs to the request
/// currently in flight. A reused pooled connection leaves the slot empty.
#[derive(Debug, Clone, Default)]
struct ConnectTimings {
    slot: Arc<Mutex<Option<ConnectSample>>>,
}

impl ConnectTimings {
    fn clear(&self) {
        let mut guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    fn set(&self, sample: ConnectSample) {
        let mut guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(sample);
    }

    /// Returns `(blocked, connect)` relative to `request_started`.
    fn split(&self, request_started: Instant) -> (Duration, Duration) {
        let guard = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        match *guard {
            Some(sample) => (
                sample.started.saturating_duration_since(request_started),
                sample.elapsed,
            ),
            None => (Duration::ZERO, Duration::ZERO),
        }
    }
}

type InnerConnector = HttpsConnector<HttpConnector>;

#[derive(Clone)]
struct TimedConnector {
    inner: InnerConnector,
    timings: ConnectTimings,
}

impl std::fmt::Debug for TimedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedConnector").finish_non_exhaustive()
    }
}

impl tower_service::Service<Uri> for TimedConnector {
    type Response = <InnerConnector as tower_service::Service<Uri>>::Response;
    type Error = <InnerConnector as tower_service::Service<Uri>>::Error;
    type Future =
        Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let timings = self.timings.clone();
        let fut = self.inner.call(uri);
        Box::pin(async move {
            let started = Instant::now();
            let res = fut.await;
            if res.is_ok() {
                timings.set(ConnectSample {
                    started,
                    elapsed: started.elapsed(),
                });
            }
            res
        })
    }
}

/// Executes one logical request at a time and reports every outcome as data.
///
/// Not `Clone` on purpose: connect timing correlation relies on sequential
/// use, so the engine hands each virtual user its own client.
#[derive(Debug)]
pub struct HttpClient {
    inner: Client<TimedConnector, Full<Bytes>>,
    timings: ConnectTimings,
}

impl Default for HttpClient {
    fn default() -> Self {
        // The OS-level TCP connect timeout can be very long (tens of
        // seconds); a short default makes failed connects surface promptly.
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl HttpClient {
    #[must_use]
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false);
        http_connector.set_connect_timeout(connect_timeout);

        let https_connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let timings = ConnectTimings::default();
        let connector = TimedConnector {
            inner: https_connector,
            timings: timings.clone(),
        };
        let inner = Client::builder(TokioExecutor::new()).build(connector);

        Self { inner, timings }
    }

    /// Runs one request attempt. Transport failures and timeouts never
    /// surface as errors; they come back as [`OutcomeStatus`] variants.
    pub async fn execute(&self, req: &HttpRequest) -> RequestOutcome {
        let started = Instant::now();
        self.timings.clear();

        match self.exchange(req, started).await {
            Ok((status, body, head_at)) => {
                let duration_total = started.elapsed();
                let (duration_blocked, duration_connect) = self.timings.split(started);
                let duration_wait =
                    head_at.saturating_sub(duration_blocked + duration_connect);

                RequestOutcome {
                    status: OutcomeStatus::Status(status),
                    duration_total,
                    duration_wait,
                    duration_connect,
                    duration_blocked,
                    body: Some(body),
                }
            }
            Err(err) => {
                let duration_total = started.elapsed();
                let (duration_blocked, duration_connect) = self.timings.split(started);
                let status = match err {
                    Error::Timeout(_) => OutcomeStatus::Timeout,
                    other => OutcomeStatus::NetworkError(other.transport_error_kind()),
                };

                RequestOutcome {
                    status,
                    duration_total,
                    duration_wait: Duration::ZERO,
                    duration_connect,
                    duration_blocked,
                    body: None,
                }
            }
        }
    }

    async fn exchange(
        &self,
        req: &HttpRequest,
        started: Instant,
    ) -> Result<(u16, Bytes, Duration)> {
        let parsed = url::Url::parse(&req.url).map_err(|_| Error::InvalidUrl(req.url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::UnsupportedScheme(req.url.clone()));
        }

        let uri: Uri = req
            .url
            .parse()
            .map_err(|_| Error::InvalidUrl(req.url.clone()))?;

        let mut builder = Request::builder().method(req.method.clone()).uri(uri);
        if !req.body.is_empty()
            && !req
                .headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        {
            builder = builder.header(http::header::CONTENT_LENGTH, req.body.len());
        }
        for (k, v) in &req.headers {
            let name = http::header::HeaderName::from_bytes(k.as_bytes())?;
            let value = http::header::HeaderValue::from_str(v)?;
            builder = builder.header(name, value);
        }

        let request: Request<Full<Bytes>> = builder.body(Full::new(req.body.clone()))?;

        // One deadline covers the whole exchange: connect, head, and body.
        let deadline = req.timeout.map(|t| tokio::time::Instant::now() + t);

        let res: hyper::Response<Incoming> = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.inner.request(request)).await {
                    Ok(res) => res?,
                    Err(_) => return Err(Error::Timeout(req.timeout.unwrap_or_default())),
                }
            }
            None => self.inner.request(request).await?,
        };
        let head_at = started.elapsed();

        let (parts, body) = res.into_parts();
        let body = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, body.collect()).await {
                Ok(collected) => collected?.to_bytes(),
                Err(_) => return Err(Error::Timeout(req.timeout.unwrap_or_default())),
            },
            None => body.collect().await?.to_bytes(),
        };

        Ok((parts.status.as_u16(), body, head_at))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn unreachable_host_reports_network_error_fast() {
        // Small connect timeout keeps the test fast and deterministic.
        let client = HttpClient::new(Some(Duration::from_millis(200)));
        let req = HttpRequest::get("http://192.0.2.1:81/");

        let started = Instant::now();
        let outcome = client.execute(&req).await;
        let elapsed = started.elapsed();

        assert!(matches!(outcome.status, OutcomeStatus::NetworkError(_)));
        assert!(outcome.body.is_none());
        assert!(
            elapsed < Duration::from_secs(2),
            "expected fast failure, elapsed={elapsed:?}"
        );
    }

    #[tokio::test]
    async fn stalled_server_reports_timeout_outcome() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept and read, but never answer.
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = HttpClient::default();
        let req =
            HttpRequest::get(&format!("http://{addr}/")).with_timeout(Duration::from_millis(200));

        let outcome = client.execute(&req).await;
        assert!(outcome.is_timeout());
        assert!(outcome.duration_total >= Duration::from_millis(200));
        assert!(outcome.duration_total < Duration::from_secs(2));

        server.abort();
    }

    #[tokio::test]
    async fn invalid_url_is_a_network_error_outcome() {
        let client = HttpClient::default();
        let outcome = client.execute(&HttpRequest::get("ftp://example.com/")).await;
        assert_eq!(
            outcome.status,
            OutcomeStatus::NetworkError(crate::TransportErrorKind::UnsupportedScheme)
        );
    }
}
