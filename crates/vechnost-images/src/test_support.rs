//! Test doubles shared by the unit tests

use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use vechnost_network::{FetchRequest, Fetcher, HttpError, Response, StatusCode};

/// A 2x2 PNG
pub(crate) fn png_bytes() -> Vec<u8> {
    let pixels = image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 31, 68, 255]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(pixels)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Records every fetch and answers from a fixed body or fails
pub(crate) struct MockFetcher {
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    started: Mutex<Vec<(String, Instant)>>,
    latency: Duration,
    body: Option<Vec<u8>>,
    failing_urls: HashSet<String>,
    panicking_urls: HashSet<String>,
}

impl MockFetcher {
    fn build(body: Option<Vec<u8>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            body,
            failing_urls: HashSet::new(),
            panicking_urls: HashSet::new(),
        }
    }

    /// Every fetch returns a decodable PNG
    pub fn succeeding() -> Self {
        Self::build(Some(png_bytes()))
    }

    /// Every fetch fails at the network level
    pub fn failing() -> Self {
        Self::build(None)
    }

    /// Every fetch returns `body` with status 200
    pub fn with_body(body: Vec<u8>) -> Self {
        Self::build(Some(body))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_for(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    /// Fetches of `url` panic
    pub fn panicking_for(mut self, url: &str) -> Self {
        self.panicking_urls.insert(url.to_string());
        self
    }

    /// URL and start time of every fetch, in start order
    pub fn started(&self) -> Vec<(String, Instant)> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<Response, HttpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking_urls.contains(&request.url) {
            panic!("fetch of {} blew up", request.url);
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        self.started
            .lock()
            .unwrap()
            .push((request.url.clone(), Instant::now()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        match &self.body {
            Some(body) if !self.failing_urls.contains(&request.url) => {
                Ok(Response::synthesized(StatusCode::OK, "image/png", body.clone()))
            }
            _ => Err(HttpError::ConnectionFailed("offline".to_string())),
        }
    }
}
