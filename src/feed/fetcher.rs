use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::document::FeedDocument;
use super::extract::ExtractionRule;
use super::parser::parse_document;
use crate::config::{Config, RssConfig};

// ============================================================================
// Errors
// ============================================================================

/// Coarse failure class. Drives the reconciler's retry policy and is what
/// the sync report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Timeout,
    Unreachable,
    TooLarge,
    Malformed,
}

impl FetchErrorKind {
    /// Timeouts and transport failures may clear up on their own. A body
    /// that is too large or not a feed will not.
    pub fn is_transient(self) -> bool {
        matches!(self, FetchErrorKind::Timeout | FetchErrorKind::Unreachable)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Unreachable => "unreachable",
            FetchErrorKind::TooLarge => "too_large",
            FetchErrorKind::Malformed => "malformed",
        })
    }
}

/// Errors that can occur while fetching one feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The absolute deadline passed before the body was fully read
    #[error("Request timed out")]
    Timeout,
    /// Transport failure or non-2xx status
    #[error("Feed unreachable: {0}")]
    Unreachable(String),
    /// Body exceeded the configured byte ceiling
    #[error("Response too large (exceeds {limit} bytes)")]
    TooLarge { limit: usize },
    /// Body was retrieved but is not a feed
    #[error("Malformed feed: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Timeout => FetchErrorKind::Timeout,
            FetchError::Unreachable(_) => FetchErrorKind::Unreachable,
            FetchError::TooLarge { .. } => FetchErrorKind::TooLarge,
            FetchError::Malformed(_) => FetchErrorKind::Malformed,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Unreachable(err.to_string())
        }
    }
}

// ============================================================================
// FeedFetcher
// ============================================================================

/// Retrieves and parses one feed document under a resource budget.
///
/// Implementations must not retry; retry policy belongs to the caller.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str, config: RssConfig) -> Result<FeedDocument, FetchError>;
}

/// HTTP implementation of [`FeedFetcher`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    rules: Arc<[ExtractionRule]>,
}

impl HttpFetcher {
    /// Build a fetcher with its own client, using the configured user agent
    /// and extraction table.
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self::with_client(client, config.extract.clone()))
    }

    pub fn with_client(client: reqwest::Client, rules: Vec<ExtractionRule>) -> Self {
        Self {
            client,
            rules: rules.into(),
        }
    }

    async fn download(&self, url: &str, limit: usize) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Unreachable(format!(
                "HTTP status {}",
                response.status().as_u16()
            )));
        }

        read_limited_bytes(response, limit).await
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    /// Fetch `url` and parse the body.
    ///
    /// The deadline covers connect, headers and the whole body. When it
    /// passes, the in-flight request future is dropped, which closes the
    /// connection.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] - deadline passed
    /// - [`FetchError::Unreachable`] - transport failure, non-2xx, truncated body
    /// - [`FetchError::TooLarge`] - body exceeded `max_content_length`
    /// - [`FetchError::Malformed`] - body is not RSS/Atom
    async fn fetch(&self, url: &str, config: RssConfig) -> Result<FeedDocument, FetchError> {
        let body = tokio::time::timeout(
            config.timeout(),
            self.download(url, config.max_content_length),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        let document =
            parse_document(&body, &self.rules).map_err(|e| FetchError::Malformed(e.to_string()))?;

        tracing::debug!(
            url = %url,
            bytes = body.len(),
            entries = document.entries.len(),
            "Fetched feed document"
        );
        Ok(document)
    }
}

/// Stream the body, failing as soon as it would pass `limit` bytes.
///
/// The buffer grows geometrically but is never reserved past `limit`, so an
/// endless or lying body costs at most `limit` plus one in-flight chunk.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: an honest Content-Length over the limit
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::TooLarge { limit });
        }
    }

    let initial = expected_length.map_or(0, |len| len as usize).min(limit);
    let mut bytes = Vec::with_capacity(initial);
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let needed = bytes.len().saturating_add(chunk.len());
        if needed > limit {
            return Err(FetchError::TooLarge { limit });
        }
        if needed > bytes.capacity() {
            let target = needed.max(bytes.capacity().saturating_mul(2)).min(limit);
            bytes.reserve_exact(target - bytes.len());
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::Unreachable(format!(
                "incomplete response: expected {} bytes, received {}",
                expected,
                bytes.len()
            )));
        }
    }

    Ok(bytes)
}
