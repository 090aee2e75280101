//! HTTP response wrapper

use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How much of a response the caller may read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// Same-origin or locally synthesized
    Basic,
    /// Cross-origin, fetched in CORS mode
    Cors,
    /// Cross-origin, fetched in no-cors mode
    Opaque,
}

/// HTTP response wrapper
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Response type
    pub response_type: ResponseType,
    /// Time to first byte
    pub ttfb: Duration,
    /// Total download time
    pub total_time: Duration,
    /// Final URL (after redirects)
    pub final_url: String,
}

impl Response {
    /// Build a locally synthesized response
    pub fn synthesized(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(content_type) {
            headers.insert(CONTENT_TYPE, value);
        }

        Self {
            status,
            headers,
            body: body.into(),
            response_type: ResponseType::Basic,
            ttfb: Duration::ZERO,
            total_time: Duration::ZERO,
            final_url: String::new(),
        }
    }

    /// Check if response was successful (2xx). Opaque responses never are.
    pub fn is_success(&self) -> bool {
        self.response_type != ResponseType::Opaque && self.status.is_success()
    }

    /// Check if the response is opaque
    pub fn is_opaque(&self) -> bool {
        self.response_type == ResponseType::Opaque
    }

    /// Get body as string
    pub fn text(&self) -> Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Get Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE)?.to_str().ok()
    }
}
