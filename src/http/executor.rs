use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{debug, error};

use crate::workload::RequestSpec;

/// Failure classification for one HTTP call. `None` marks a call that
/// produced a response at all; 4xx/5xx are scored by checks, never
/// treated as engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    None,
    Timeout,
    Connection,
    Dns,
}

impl ErrorKind {
    #[must_use]
    pub const fn is_failure(self) -> bool {
        !matches!(self, ErrorKind::None)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Dns => "dns",
        }
    }
}

/// Result of one HTTP call: status code (absent on network-level failure),
/// wall-clock latency from issuance to outcome, and the failure class.
#[derive(Debug, Clone, Copy)]
pub struct RequestOutcome {
    pub status: Option<u16>,
    pub latency: Duration,
    pub error: ErrorKind,
}

impl RequestOutcome {
    #[must_use]
    pub const fn response(status: u16, latency: Duration) -> Self {
        Self {
            status: Some(status),
            latency,
            error: ErrorKind::None,
        }
    }

    #[must_use]
    pub const fn failure(error: ErrorKind, latency: Duration) -> Self {
        Self {
            status: None,
            latency,
            error,
        }
    }
}

/// Executes one request spec and classifies the outcome.
///
/// Latency covers issuance to outcome determination, including the full
/// body transfer and the failure/timeout cases. The hard per-call bound
/// comes from the client's request timeout.
pub async fn execute(client: &Client, spec: &RequestSpec) -> RequestOutcome {
    let start = Instant::now();
    let response = client
        .request(spec.method.as_method(), spec.url.clone())
        .send()
        .await;

    match response {
        Ok(response) => {
            let status = response.status().as_u16();
            match drain_response_body(response).await {
                Ok(bytes) => {
                    debug!("{} -> {} ({} bytes)", spec.label(), status, bytes);
                    RequestOutcome::response(status, start.elapsed())
                }
                Err(err) => classify(&err, spec, start.elapsed()),
            }
        }
        Err(err) => classify(&err, spec, start.elapsed()),
    }
}

fn classify(err: &reqwest::Error, spec: &RequestSpec, latency: Duration) -> RequestOutcome {
    error!("Request {} failed: {}", spec.label(), err);
    let kind = if err.is_timeout() {
        ErrorKind::Timeout
    } else if is_dns_failure(err) {
        ErrorKind::Dns
    } else {
        ErrorKind::Connection
    };
    RequestOutcome::failure(kind, latency)
}

/// Reqwest does not expose DNS failures directly; the resolver reports
/// them as a connect error whose source chain names the lookup.
fn is_dns_failure(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        let message = inner.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = inner.source();
    }
    false
}

async fn drain_response_body(response: reqwest::Response) -> Result<u64, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut total_bytes: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        total_bytes = total_bytes.saturating_add(u64::try_from(bytes.len()).unwrap_or(u64::MAX));
    }
    Ok(total_bytes)
}
