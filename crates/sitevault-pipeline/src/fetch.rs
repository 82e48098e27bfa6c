//! Resource acquisition: raw HTTP fetching and validated acquisition.
//!
//! # Design
//! - [`Fetcher`] is the network seam; tests substitute in-memory fetchers.
//! - [`Acquire`] couples a fetch with content validation so direct fetches and
//!   CDN substitutes go through the same gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use sitevault_events::ResourceKind;
use sitevault_telemetry::Metrics;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::validator::{self, ValidationVerdict};

/// Errors raised while fetching a resource.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed.
    #[error("invalid resource url")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },
    /// Only `http` and `https` URLs are fetched.
    #[error("unsupported url scheme")]
    UnsupportedScheme {
        /// Offending URL.
        url: String,
    },
    /// The request failed before a response arrived.
    #[error("http request failed")]
    Request {
        /// Requested URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("http status not successful")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The fetch exceeded its deadline.
    #[error("fetch timed out")]
    Timeout {
        /// Requested URL.
        url: String,
        /// Deadline that elapsed.
        after: Duration,
    },
    /// The HTTP client could not be constructed.
    #[error("http client could not be built")]
    Client {
        /// Underlying client error.
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Stable label used for metrics and records.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::UnsupportedScheme { .. } => "unsupported_scheme",
            Self::Request { source, .. } if source.is_timeout() => "timeout",
            Self::Request { .. } => "request_failed",
            Self::Status { .. } => "http_status",
            Self::Timeout { .. } => "timeout",
            Self::Client { .. } => "client_unavailable",
        }
    }

    /// HTTP status when the server answered unsuccessfully.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Fetches the raw bytes behind a URL.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve the full body of `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[async_trait]
impl<F: Fetcher + ?Sized> Fetcher for Arc<F> {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        (**self).fetch(url).await
    }
}

/// Layering helpers for fetchers.
pub trait FetcherExt: Fetcher + Sized {
    /// Bound every fetch by `timeout`.
    fn with_timeout(self, timeout: Duration) -> TimeoutFetcher<Self> {
        TimeoutFetcher::new(self, timeout)
    }
}

impl<F: Fetcher> FetcherExt for F {}

/// `reqwest`-backed fetcher sending a desktop browser user agent.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a client with the given user agent and per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] when the TLS backend cannot initialise.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Client { source })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let parsed = Url::parse(url).map_err(|source| FetchError::InvalidUrl {
            url: url.to_string(),
            source,
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
            });
        }
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })
    }
}

/// Timeout decorator for any [`Fetcher`].
#[derive(Debug, Clone)]
pub struct TimeoutFetcher<F> {
    inner: F,
    timeout: Duration,
}

impl<F: Fetcher> TimeoutFetcher<F> {
    /// Wrap `inner` so every fetch is bounded by `timeout`.
    pub const fn new(inner: F, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for TimeoutFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        tokio::time::timeout(self.timeout, self.inner.fetch(url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: url.to_string(),
                after: self.timeout,
            })?
    }
}

/// Why a validated acquisition produced no usable payload.
#[derive(Debug)]
pub enum AcquireFailure {
    /// The fetch itself failed.
    Fetch(FetchError),
    /// The payload arrived but failed content validation.
    Rejected(ValidationVerdict),
}

impl AcquireFailure {
    /// Stable label for records and logs.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Fetch(error) => error.reason(),
            Self::Rejected(verdict) => verdict.reason.unwrap_or("invalid_payload"),
        }
    }
}

/// Fetch-then-validate acquisition of one URL.
#[async_trait]
pub trait Acquire: Send + Sync {
    /// Acquire `url` and check it really is a `kind` payload.
    async fn acquire(&self, url: &str, kind: ResourceKind) -> Result<Bytes, AcquireFailure>;
}

/// [`Acquire`] over a [`Fetcher`], recording failures in metrics.
#[derive(Clone)]
pub struct ValidatingFetcher {
    fetcher: Arc<dyn Fetcher>,
    metrics: Option<Metrics>,
}

impl ValidatingFetcher {
    /// Validate everything `fetcher` returns.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, metrics: Option<Metrics>) -> Self {
        Self { fetcher, metrics }
    }
}

#[async_trait]
impl Acquire for ValidatingFetcher {
    async fn acquire(&self, url: &str, kind: ResourceKind) -> Result<Bytes, AcquireFailure> {
        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(url, reason = error.reason(), error = %error, "fetch failed");
                if let Some(metrics) = &self.metrics {
                    metrics.inc_fetch_failure(error.reason());
                }
                return Err(AcquireFailure::Fetch(error));
            }
        };
        let verdict = validator::validate(&bytes, kind);
        if !verdict.valid {
            debug!(url, kind = kind.as_str(), reason = verdict.reason, "payload rejected");
            if let Some(metrics) = &self.metrics {
                metrics.inc_validation_rejection(kind.as_str());
            }
            return Err(AcquireFailure::Rejected(verdict));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Slow;

    #[async_trait]
    impl Fetcher for Slow {
        async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Bytes::new())
        }
    }

    struct Fixed(&'static [u8]);

    #[async_trait]
    impl Fetcher for Fixed {
        async fn fetch(&self, _url: &str) -> Result<Bytes, FetchError> {
            Ok(Bytes::from_static(self.0))
        }
    }

    #[tokio::test]
    async fn timeout_layer_reports_timeout() {
        let fetcher = Slow.with_timeout(Duration::from_millis(20));
        let err = fetcher
            .fetch("https://a.test/slow.js")
            .await
            .expect_err("should time out");
        assert_eq!(err.reason(), "timeout");
    }

    #[tokio::test]
    async fn http_fetcher_refuses_non_http_schemes() -> anyhow::Result<()> {
        let fetcher = HttpFetcher::new("test-agent", Duration::from_secs(1))?;
        let err = fetcher
            .fetch("ftp://a.test/file.css")
            .await
            .expect_err("ftp is refused");
        assert_eq!(err.reason(), "unsupported_scheme");
        let err = fetcher.fetch("not a url").await.expect_err("unparseable");
        assert_eq!(err.reason(), "invalid_url");
        Ok(())
    }

    #[tokio::test]
    async fn validating_fetcher_rejects_error_pages() -> anyhow::Result<()> {
        let metrics = Metrics::new()?;
        let acquirer = ValidatingFetcher::new(
            Arc::new(Fixed(b"<!DOCTYPE html><html>gone</html>")),
            Some(metrics.clone()),
        );
        let failure = acquirer
            .acquire("https://a.test/site.css", ResourceKind::Css)
            .await
            .expect_err("html is rejected");
        assert_eq!(failure.reason(), "html_payload");
        assert!(metrics.render()?.contains("sitevault_validation_rejections_total"));
        Ok(())
    }
}
