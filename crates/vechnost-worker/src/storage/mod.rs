//! Persistent cache storage
//!
//! Named buckets of request URL -> stored response, the shape of the
//! browser Cache API. Per-key `put` and `match_in` are atomic; `put_all`
//! stores every entry or none.

mod disk;
mod memory;

pub use disk::{DiskCacheConfig, DiskCacheStorage};
pub use memory::MemoryCacheStorage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;
use vechnost_network::{Bytes, Response, ResponseType, StatusCode};

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid cache entry: {0}")]
    InvalidEntry(String),

    #[error("Version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },

    #[error("Invalid bucket name: {0:?}")]
    InvalidBucketName(String),
}

/// A response as kept in a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Request URL, the entry key
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub response_type: ResponseType,
    pub body: Vec<u8>,
}

impl CachedResponse {
    /// Copy a network response for storage under `url`
    pub fn from_response(url: &str, response: &Response) -> Self {
        Self {
            url: url.to_string(),
            status: response.status.as_u16(),
            content_type: response.content_type().map(str::to_string),
            response_type: response.response_type,
            body: response.body.to_vec(),
        }
    }

    /// Rebuild a response to hand back to the page
    pub fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let content_type = self.content_type.as_deref().unwrap_or("application/octet-stream");

        let mut response = Response::synthesized(status, content_type, Bytes::from(self.body));
        response.response_type = self.response_type;
        response.final_url = self.url;
        response
    }
}

/// Bucketed response storage
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create `bucket` if missing
    async fn open(&self, bucket: &str) -> Result<(), StorageError>;

    /// Names of every bucket
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove `bucket` with all its entries. False when it did not exist.
    async fn delete(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Store `entry` under its URL, replacing any previous entry
    async fn put(&self, bucket: &str, entry: CachedResponse) -> Result<(), StorageError>;

    /// Store every entry, or none of them. After a failure none of the
    /// given URLs are left in the bucket.
    async fn put_all(&self, bucket: &str, entries: Vec<CachedResponse>) -> Result<(), StorageError>;

    /// Entry for `url` in `bucket`
    async fn match_in(&self, bucket: &str, url: &str) -> Result<Option<CachedResponse>, StorageError>;

    /// Entry for `url` in the first bucket (by `keys` order) that has one
    async fn match_any(&self, url: &str) -> Result<Option<CachedResponse>, StorageError> {
        for bucket in self.keys().await? {
            if let Some(entry) = self.match_in(&bucket, url).await? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// URLs stored in `bucket`
    async fn urls(&self, bucket: &str) -> Result<Vec<String>, StorageError>;
}

/// Bucket names become directory names; keep them to a portable alphabet
pub(crate) fn validate_bucket_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidBucketName(name.to_string()))
    }
}
