//! Test doubles shared by the unit tests

use crate::storage::{CacheStorage, CachedResponse, StorageError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::Instant;
use vechnost_network::{
    FetchRequest, Fetcher, HttpError, RequestMode, Response, ResponseType, StatusCode,
};

/// Scripted network. Bodies read `body:<url>`; no-cors requests come back
/// opaque.
pub(crate) struct MockNetwork {
    online: AtomicBool,
    failing_urls: HashSet<String>,
    statuses: HashMap<String, u16>,
    log: Mutex<Vec<(String, RequestMode, Instant)>>,
}

impl MockNetwork {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
            failing_urls: HashSet::new(),
            statuses: HashMap::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    /// URL, mode and start time of every fetch, in start order
    pub fn log(&self) -> Vec<(String, RequestMode, Instant)> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl Fetcher for MockNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        self.log
            .lock()
            .unwrap()
            .push((request.url.clone(), request.mode, Instant::now()));

        if !self.online.load(Ordering::SeqCst) || self.failing_urls.contains(&request.url) {
            return Err(HttpError::ConnectionFailed("offline".to_string()));
        }

        let status = self.statuses.get(&request.url).copied().unwrap_or(200);
        let mut response = Response::synthesized(
            StatusCode::from_u16(status).unwrap(),
            "image/jpeg",
            format!("body:{}", request.url),
        );
        response.final_url = request.url.clone();
        if request.mode == RequestMode::NoCors {
            response.response_type = ResponseType::Opaque;
        }
        Ok(response)
    }
}

/// Storage whose every operation fails
pub(crate) struct FailingStorage;

fn broken() -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "quota exceeded"))
}

#[async_trait]
impl CacheStorage for FailingStorage {
    async fn open(&self, _bucket: &str) -> Result<(), StorageError> {
        Err(broken())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Err(broken())
    }

    async fn delete(&self, _bucket: &str) -> Result<bool, StorageError> {
        Err(broken())
    }

    async fn put(&self, _bucket: &str, _entry: CachedResponse) -> Result<(), StorageError> {
        Err(broken())
    }

    async fn put_all(&self, _bucket: &str, _entries: Vec<CachedResponse>) -> Result<(), StorageError> {
        Err(broken())
    }

    async fn match_in(&self, _bucket: &str, _url: &str) -> Result<Option<CachedResponse>, StorageError> {
        Err(broken())
    }

    async fn urls(&self, _bucket: &str) -> Result<Vec<String>, StorageError> {
        Err(broken())
    }
}
