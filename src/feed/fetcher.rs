use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::feed::cache::Validators;
use crate::feed::parser::{parse_feed, NormalizedEntry};

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default bound on one whole fetch (connect, headers and body)
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(12);

pub const DEFAULT_USER_AGENT: &str = "SUPRSS/1.0";

/// Errors that can occur while fetching one feed.
///
/// All of them are transient from the engine's point of view: the feed is
/// skipped for this cycle and the next sweep tries again.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with a status that is neither 2xx nor 304
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// The whole fetch exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server answered 304: nothing changed since the cached validators
    NotModified { validators: Validators },
    /// A fresh body, parsed into entries in document order
    Fetched {
        entries: Vec<NormalizedEntry>,
        validators: Validators,
    },
}

impl FetchOutcome {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchOutcome::NotModified { .. })
    }

    /// Validators carried by the response (possibly empty)
    pub fn validators(&self) -> &Validators {
        match self {
            FetchOutcome::NotModified { validators } => validators,
            FetchOutcome::Fetched { validators, .. } => validators,
        }
    }

    /// Parsed entries; always empty for a not-modified response
    pub fn entries(&self) -> &[NormalizedEntry] {
        match self {
            FetchOutcome::NotModified { .. } => &[],
            FetchOutcome::Fetched { entries, .. } => entries,
        }
    }
}

/// Build the HTTP client shared by all refresh paths.
pub fn build_client(user_agent: &str) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().user_agent(user_agent).build()
}

/// Fetch and parse one feed.
///
/// With `cached` validators the request is conditional (`If-None-Match`,
/// `If-Modified-Since`) and a 304 answer short-circuits to
/// [`FetchOutcome::NotModified`] without reading or parsing a body.
/// Passing `None` always downloads the full document.
///
/// # Errors
///
/// - [`FetchError::Timeout`] - the whole exchange exceeded `timeout`
/// - [`FetchError::Network`] - connection, TLS or body stream failure
/// - [`FetchError::HttpStatus`] - any status other than 2xx or 304
/// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
/// - [`FetchError::Parse`] - the body is not RSS or Atom
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    cached: Option<&Validators>,
    timeout: Duration,
) -> Result<FetchOutcome, FetchError> {
    let mut request = client.get(url);
    if let Some(cached) = cached {
        if let Some(etag) = &cached.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(modified) = &cached.last_modified {
            request = request.header(IF_MODIFIED_SINCE, modified);
        }
    }

    let (body, validators) = tokio::time::timeout(timeout, exchange(request))
        .await
        .map_err(|_| FetchError::Timeout)??;

    let Some(bytes) = body else {
        tracing::debug!(feed = %url, "Feed not modified");
        return Ok(FetchOutcome::NotModified { validators });
    };

    let entries = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;
    tracing::debug!(feed = %url, entries = entries.len(), "Feed fetched");

    Ok(FetchOutcome::Fetched {
        entries,
        validators,
    })
}

/// Send the request and read the body; `None` body means 304.
async fn exchange(
    request: reqwest::RequestBuilder,
) -> Result<(Option<Vec<u8>>, Validators), FetchError> {
    let response = request.send().await?;
    let validators = response_validators(&response);

    if response.status() == StatusCode::NOT_MODIFIED {
        return Ok((None, validators));
    }
    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    Ok((Some(bytes), validators))
}

fn response_validators(response: &reqwest::Response) -> Validators {
    let header = |name: HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    Validators {
        etag: header(ETAG).map(str::to_string),
        last_modified: header(LAST_MODIFIED).and_then(normalize_http_date),
    }
}

/// Re-render an HTTP date in IMF-fixdate form.
///
/// Servers send `Last-Modified` in assorted RFC 2822 variants; storing the
/// canonical form keeps `If-Modified-Since` well-formed. Unparseable values
/// yield `None` and are not cached.
pub fn normalize_http_date(raw: &str) -> Option<String> {
    match DateTime::parse_from_rfc2822(raw) {
        Ok(dt) => Some(
            dt.with_timezone(&Utc)
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        ),
        Err(e) => {
            tracing::debug!(value = %raw, error = %e, "Ignoring unparseable Last-Modified");
            None
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
