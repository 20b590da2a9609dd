//! Generic JSON request/response exchange.
//!
//! # Responsibility
//! - Resolve endpoint paths against the configured base URL.
//! - Send requests and classify outcomes into `TransportError`.
//!
//! # Invariants
//! - Absolute paths (with a scheme) are used verbatim. A scheme-like string
//!   inside the query does not make a path absolute.
//! - Relative paths are appended segment-wise to the base path; their query
//!   string is preserved.
//! - Any status outside 200..=299 is reported as `StatusCode` with the raw
//!   body, never decoded here.

use crate::config::BackendConfig;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use url::ParseError;
use thiserror::Error;

/// Low-level exchange failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unexpected status {status}")]
    StatusCode { status: u16, body: Vec<u8> },
    #[error("transport failure: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

/// One outbound request with an already-encoded JSON body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub path: String,
    pub method: HttpMethod,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn post(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            method: HttpMethod::Post,
            headers: Vec::new(),
            body,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header value matching `name` case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Seam between the backend client and the network.
///
/// Returns the raw 2xx body; every other outcome is a `TransportError`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>, TransportError>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    /// Builds a client honoring the configured request/resource timeouts.
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let base_url = Url::parse(config.base_url.trim())
            .map_err(|err| TransportError::InvalidUrl(format!("{}: {err}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(config.base_url.clone()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .read_timeout(config.request_timeout)
            .timeout(config.resource_timeout)
            .build()
            .map_err(|err| TransportError::Transport(err.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Vec<u8>, TransportError> {
        let url = resolve_url(&self.base_url, &request.path)?;

        let mut builder = self
            .client
            .request(request.method.as_reqwest(), url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if request.method == HttpMethod::Post {
            builder = builder.body(request.body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Transport(err.to_string()))?
            .to_vec();

        if !(200..=299).contains(&status) {
            return Err(TransportError::StatusCode { status, body });
        }
        Ok(body)
    }
}

/// Resolves `path` against `base`.
///
/// Existing percent-escapes in `path` are kept as written.
pub fn resolve_url(base: &Url, path: &str) -> Result<Url, TransportError> {
    let trimmed = path.trim();
    match Url::parse(trimmed) {
        Ok(url) => return Ok(url),
        Err(ParseError::RelativeUrlWithoutBase) => {}
        Err(err) => return Err(TransportError::InvalidUrl(format!("{trimmed}: {err}"))),
    }
    if base.cannot_be_a_base() {
        return Err(TransportError::InvalidUrl(base.to_string()));
    }

    let (path_part, query) = match trimmed.split_once('?') {
        Some((path_part, query)) => (path_part, Some(query)),
        None => (trimmed, None),
    };

    let mut joined = base.path().trim_end_matches('/').to_string();
    for segment in path_part.split('/').filter(|segment| !segment.is_empty()) {
        joined.push('/');
        joined.push_str(segment);
    }
    if joined.is_empty() {
        joined.push('/');
    }

    let mut url = base.clone();
    url.set_path(&joined);
    url.set_query(query.filter(|value| !value.is_empty()));
    Ok(url)
}
