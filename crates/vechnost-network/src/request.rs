//! Fetch requests and their classification
//!
//! A request carries the URL, the destination the page declared for it
//! (the `destination` metadata of a browser fetch) and the request mode.
//! Service workers route on the destination first and fall back to the
//! file extension of the URL path.

use serde::{Deserialize, Serialize};
use url::Url;

/// Declared destination of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResourceType {
    /// Issued by an image element
    Image,
    /// Anything else; routed on the URL alone
    #[default]
    Other,
}

/// Request mode, mirroring the fetch standard's CORS handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RequestMode {
    /// Cross-origin reads allowed, response is readable (`crossOrigin = "anonymous"`)
    #[default]
    Cors,
    /// Cross-origin tolerant; cross-origin responses come back opaque
    NoCors,
}

/// A single fetch issued by a page or a worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute request URL, also the cache key
    pub url: String,
    /// Declared destination
    pub destination: ResourceType,
    /// CORS mode
    pub mode: RequestMode,
}

impl FetchRequest {
    /// Request with an unknown destination
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            destination: ResourceType::Other,
            mode: RequestMode::Cors,
        }
    }

    /// Request issued by an `<img>` element
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            destination: ResourceType::Image,
            ..Self::new(url)
        }
    }

    /// Switch the request mode
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Path component of the URL, or the raw string when it does not parse
    pub fn path(&self) -> String {
        match Url::parse(&self.url) {
            Ok(url) => url.path().to_string(),
            Err(_) => self.url.clone(),
        }
    }

    /// True when the URL path ends in one of `extensions` (case-insensitive)
    pub fn has_extension(&self, extensions: &[String]) -> bool {
        let path = self.path().to_ascii_lowercase();
        let Some((_, ext)) = path.rsplit_once('.') else {
            return false;
        };
        extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}
