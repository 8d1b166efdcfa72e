use std::time::Duration;

use bytes::Bytes;

use crate::error::TransportErrorKind;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: &str) -> Self {
        Self {
            method: http::Method::GET,
            url: url.to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How a single request attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The server answered; any status code, including 4xx/5xx.
    Status(u16),
    /// The caller-supplied timeout elapsed before the exchange completed.
    Timeout,
    /// The exchange failed below HTTP (connect, DNS, reset, ...).
    NetworkError(TransportErrorKind),
}

/// The result of one request attempt, always expressed as data.
///
/// Timings follow the usual load-tool split: `blocked` is time spent before a
/// connection attempt started, `connect` is the connection setup (zero when a
/// pooled connection was reused), `wait` is from request dispatch until the
/// response head arrived, and `total` covers the whole exchange including the
/// body read.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub status: OutcomeStatus,
    pub duration_total: Duration,
    pub duration_wait: Duration,
    pub duration_connect: Duration,
    pub duration_blocked: Duration,
    pub body: Option<Bytes>,
}

impl RequestOutcome {
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self.status {
            OutcomeStatus::Status(code) => Some(code),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.status, OutcomeStatus::Timeout)
    }

    #[must_use]
    pub fn body_utf8(&self) -> Option<&str> {
        self.body.as_deref().and_then(|b| std::str::from_utf8(b).ok())
    }
}
