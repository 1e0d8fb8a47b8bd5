use crate::feed::parser::{parse_feed, ParseResult, RawItem};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching one feed.
///
/// Every kind is recoverable at the per-blog level: the caller marks the
/// owning blog failing and moves on to the next one.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The fetch (request plus body) exceeded the configured timeout
    #[error("request timed out")]
    Timeout,
    /// The feed URL returned HTTP 404
    #[error("feed not found")]
    NotFound,
    /// The response was not a parseable RSS/Atom document
    #[error("parse error: {0}")]
    Parse(String),
    /// Anything else that went wrong on the wire (DNS, TLS, non-2xx status,
    /// oversized body)
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Fetch and parse a single feed, bounded by `timeout` end to end.
///
/// Zero items is success, not an error: quiet blogs simply contribute
/// nothing this tick.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<RawItem>, FetchError> {
    // One timeout over request + body read, so a drip-feeding server
    // cannot hold the tick open past the budget.
    let bytes = tokio::time::timeout(timeout, fetch_bytes(client, url))
        .await
        .map_err(|_| FetchError::Timeout)??;

    let ParseResult { items, skipped } =
        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

    if skipped > 0 {
        tracing::debug!(feed = %url, skipped = skipped, "Dropped entries without link or date");
    }

    Ok(items)
}

async fn fetch_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(FetchError::from_reqwest)?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound);
    }
    if !response.status().is_success() {
        return Err(FetchError::Network(format!(
            "HTTP status {}",
            response.status()
        )));
    }

    read_limited_bytes(response, MAX_FEED_SIZE).await
}

/// Stream the body with a hard size cap so a hostile feed cannot exhaust
/// memory.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::Network("response too large".to_string()));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::from_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::Network("response too large".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
