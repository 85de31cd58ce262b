use std::fmt;
use std::time::{Duration, Instant};

use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Proxy, Url};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::cancel::cancelled;
use crate::error::{EngineError, Result};

use super::request::RequestSpec;

/// A response as it came off the wire, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names in transport (lowercase) form, in arrival order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    InvalidUrl,
    InvalidRequest,
    Connect,
    Timeout,
    Cancelled,
    /// The server answered with a non-2xx status.
    Status,
    Body,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Present when a server did answer.
    pub response: Option<RawResponse>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            response: None,
        }
    }

    pub fn status(response: RawResponse) -> Self {
        Self {
            kind: TransportErrorKind::Status,
            message: format!("Request failed with status code {}", response.status),
            response: Some(response),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(TransportErrorKind::Cancelled, "Request cancelled")
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_builder() {
            TransportErrorKind::InvalidRequest
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, format!("Request failed: {err}"))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TransportError {}

/// Outcome of one dispatch plus the wall-clock time spent on it.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub outcome: std::result::Result<RawResponse, TransportError>,
    pub elapsed: Duration,
}

impl Dispatch {
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Issues exactly one HTTP call per [`RequestSpec`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: Client,
}

impl Dispatcher {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut builder =
            Client::builder().redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        if let Some(proxy_url) = config.proxy_url.as_deref().filter(|url| !url.is_empty()) {
            let proxy = Proxy::all(proxy_url).map_err(|err| EngineError::Config {
                message: format!("Invalid proxy URL: {err}"),
            })?;
            builder = builder.proxy(proxy);
        }

        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(|err| EngineError::Config {
            message: format!("Failed to build HTTP client: {err}"),
        })?;
        Ok(Self { client })
    }

    /// Send `spec` once. Never retries; a cancel signal on `cancel_rx` aborts
    /// the call in flight.
    pub async fn dispatch(
        &self,
        spec: &RequestSpec,
        cancel_rx: &mut broadcast::Receiver<()>,
    ) -> Dispatch {
        let started = Instant::now();
        debug!(method = %spec.method, url = %spec.url, "Dispatching request");

        let outcome = match self.build_request(spec) {
            Ok(request) => tokio::select! {
                result = execute(request) => result,
                _ = cancelled(cancel_rx) => Err(TransportError::cancelled()),
            },
            Err(err) => Err(err),
        };
        let elapsed = started.elapsed();

        match &outcome {
            Ok(response) => info!(
                method = %spec.method,
                url = %spec.url,
                status = response.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "Request completed"
            ),
            Err(err) => warn!(
                method = %spec.method,
                url = %spec.url,
                kind = ?err.kind,
                error = %err,
                "Request failed"
            ),
        }

        Dispatch { outcome, elapsed }
    }

    fn build_request(
        &self,
        spec: &RequestSpec,
    ) -> std::result::Result<reqwest::RequestBuilder, TransportError> {
        let url = build_url(spec)?;
        let headers = build_headers(&spec.outgoing_headers())?;

        let mut request = self
            .client
            .request(spec.method.into(), url)
            .headers(headers);
        if let Some(body) = spec.outgoing_body() {
            request = request.body(body);
        }
        Ok(request)
    }
}

async fn execute(
    request: reqwest::RequestBuilder,
) -> std::result::Result<RawResponse, TransportError> {
    let response = request.send().await.map_err(TransportError::from_reqwest)?;

    let status = response.status();
    let status_text = reason_phrase(&response);
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();

    let bytes = response.bytes().await.map_err(|err| {
        TransportError::new(TransportErrorKind::Body, format!("Failed to read response: {err}"))
    })?;

    let raw = RawResponse {
        status: status.as_u16(),
        status_text,
        headers,
        body: bytes.to_vec(),
    };

    if status.is_success() {
        Ok(raw)
    } else {
        Err(TransportError::status(raw))
    }
}

/// The reason phrase the server sent. hyper only records it when it differs
/// from the canonical one, so fall back to that.
fn reason_phrase(response: &reqwest::Response) -> String {
    match response.extensions().get::<ReasonPhrase>() {
        Some(phrase) => String::from_utf8_lossy(phrase.as_bytes()).into_owned(),
        None => response.status().canonical_reason().unwrap_or_default().to_string(),
    }
}

/// The request URL with enabled params appended as a query string.
pub fn build_url(spec: &RequestSpec) -> std::result::Result<Url, TransportError> {
    let mut url = Url::parse(spec.url.trim()).map_err(|err| {
        TransportError::new(
            TransportErrorKind::InvalidUrl,
            format!("Invalid URL `{}`: {err}", spec.url),
        )
    })?;

    let params = spec.outgoing_params();
    if !params.is_empty() {
        let mut query_pairs = url.query_pairs_mut();
        for (key, value) in &params {
            query_pairs.append_pair(key, value);
        }
    }

    Ok(url)
}

pub fn build_headers(pairs: &[(String, String)]) -> std::result::Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();

    for (key, value) in pairs {
        let header_name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            TransportError::new(
                TransportErrorKind::InvalidRequest,
                format!("Invalid header name `{key}`: {err}"),
            )
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|err| {
            TransportError::new(
                TransportErrorKind::InvalidRequest,
                format!("Invalid header value for `{key}`: {err}"),
            )
        })?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}
