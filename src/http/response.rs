//! Response metadata delivered ahead of the body.

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use std::time::{Duration, Instant};
use url::Url;

/// Status line and headers of a response, without the body.
///
/// This is what the stream bridge hands out through
/// [`PendingResponse`](crate::stream::PendingResponse).
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    url: Url,
}

impl ResponseMeta {
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap, url: Url) -> Self {
        Self { status, version, headers, url }
    }

    /// Build from the head of a hyper response.
    pub fn from_parts(parts: &http::response::Parts, url: Url) -> Self {
        Self {
            status: parts.status,
            version: parts.version,
            headers: parts.headers.clone(),
            url,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Final URL, after redirects.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Value of `Content-Length`, if present and well formed.
    pub fn expected_content_length(&self) -> Option<u64> {
        self.headers
            .get(http::header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// First header value matching `name`, as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// A response proposed for caching, passed to `WillCacheResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub response: ResponseMeta,
    pub data: Bytes,
}

/// Timing and transfer counters collected over a task's lifetime.
#[derive(Debug, Clone)]
pub struct TaskMetrics {
    pub fetch_start: Instant,
    pub response_start: Option<Instant>,
    pub response_end: Instant,
    pub redirect_count: u32,
    pub request_body_bytes_sent: u64,
    pub response_body_bytes_received: u64,
}

impl TaskMetrics {
    /// Wall time from fetch start to the end of the response.
    pub fn duration(&self) -> Duration {
        self.response_end.saturating_duration_since(self.fetch_start)
    }

    /// Time to first byte of the response head, if one arrived.
    pub fn time_to_first_byte(&self) -> Option<Duration> {
        self.response_start
            .map(|start| start.saturating_duration_since(self.fetch_start))
    }
}
