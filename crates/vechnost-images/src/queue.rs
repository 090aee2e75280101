//! Image preload queue
//!
//! Loads images into a session-lifetime memory cache with bounded
//! concurrency. Properties:
//! - one load per URL at a time; concurrent callers share its completion
//! - at most `max_parallel_loads` loads in flight, FIFO issuance
//! - failures settle the completion and are never surfaced to callers
//! - cached images are never evicted or refreshed
//!
//! The queue is an owned component: construct one per page session and
//! hand clones to whoever paints images.

use crate::config::LoaderConfig;
use crate::decode::{self, DecodedImage};
use std::collections::{HashMap, VecDeque};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vechnost_network::{FetchRequest, Fetcher, HttpError};

/// Shared handle to a cached image
pub type ImageHandle = Arc<DecodedImage>;

/// Why a single image did not load. Logged, never returned to callers.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Network(#[from] HttpError),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("load aborted: {0}")]
    Aborted(String),
}

/// Settles once the load behind a `preload` call has finished, whatever
/// its outcome
#[derive(Debug)]
pub struct Completion {
    rx: Option<watch::Receiver<bool>>,
}

impl Completion {
    fn ready() -> Self {
        Self { rx: None }
    }

    fn pending(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// True once the underlying load has settled
    pub fn is_settled(&self) -> bool {
        self.rx.as_ref().map_or(true, |rx| *rx.borrow())
    }

    /// Wait for settlement
    pub async fn wait(self) {
        if let Some(mut rx) = self.rx {
            // A dropped sender also means the load is over
            let _ = rx.wait_for(|settled| *settled).await;
        }
    }
}

impl IntoFuture for Completion {
    type Output = ();
    type IntoFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

/// Outcome of a `preload_many` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// URLs passed in
    pub requested: usize,
    /// Of those, how many are now in the memory cache
    pub loaded: usize,
}

impl PreloadReport {
    pub fn failed(&self) -> usize {
        self.requested - self.loaded
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Images in the memory cache
    pub cached: usize,
    /// Tasks waiting for a slot
    pub queued: usize,
    /// Loads currently running
    pub loading: usize,
    /// Highest `loading` observed
    pub peak_loading: usize,
    /// Loads started since creation
    pub loads_started: u64,
    /// Loads that ended without an image
    pub loads_failed: u64,
}

struct QueueState {
    cache: HashMap<String, ImageHandle>,
    /// Every task between enqueue and settlement, keyed by URL
    tasks: HashMap<String, watch::Sender<bool>>,
    pending: VecDeque<String>,
    loading: usize,
    peak_loading: usize,
    loads_started: u64,
    loads_failed: u64,
}

struct Inner {
    config: LoaderConfig,
    fetcher: Arc<dyn Fetcher>,
    state: Mutex<QueueState>,
}

/// Bounded-concurrency image loader with a memory cache
///
/// `preload` and `preload_many` spawn onto the ambient tokio runtime.
#[derive(Clone)]
pub struct ImagePreloader {
    inner: Arc<Inner>,
}

impl ImagePreloader {
    /// Create a preloader fetching through `fetcher`
    pub fn new(config: LoaderConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        info!(
            "Image preloader ready ({:?}: {} parallel, batches of {}, {:?} pacing)",
            config.engine, config.max_parallel_loads, config.batch_size, config.inter_batch_delay
        );

        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                state: Mutex::new(QueueState {
                    cache: HashMap::new(),
                    tasks: HashMap::new(),
                    pending: VecDeque::new(),
                    loading: 0,
                    peak_loading: 0,
                    loads_started: 0,
                    loads_failed: 0,
                }),
            }),
        }
    }

    /// Loader configuration, read-only
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Queue `url` for loading.
    ///
    /// Returns a settled completion when the image is cached and joins the
    /// existing task when one is queued or loading.
    pub fn preload(&self, url: &str) -> Completion {
        let rx = {
            let mut state = self.inner.lock_state();

            if state.cache.contains_key(url) {
                return Completion::ready();
            }
            if let Some(tx) = state.tasks.get(url) {
                return Completion::pending(tx.subscribe());
            }

            let (tx, rx) = watch::channel(false);
            state.tasks.insert(url.to_string(), tx);
            state.pending.push_back(url.to_string());
            rx
        };

        Inner::drain(&self.inner);
        Completion::pending(rx)
    }

    /// Preload `urls` in batches of `batch_size`, pacing issuance by
    /// `inter_batch_delay`. Resolves once every load has settled.
    pub async fn preload_many<I, S>(&self, urls: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: Vec<String> = urls.into_iter().map(|u| u.as_ref().to_string()).collect();
        if urls.is_empty() {
            return PreloadReport::default();
        }

        let batch_size = self.inner.config.batch_size.max(1);
        let delay = self.inner.config.inter_batch_delay;
        let batch_count = urls.len().div_ceil(batch_size);

        let mut completions = Vec::with_capacity(urls.len());
        for (index, batch) in urls.chunks(batch_size).enumerate() {
            completions.extend(batch.iter().map(|url| self.preload(url)));

            if !delay.is_zero() && index + 1 < batch_count {
                tokio::time::sleep(delay).await;
            }
        }

        for completion in completions {
            completion.await;
        }

        let loaded = {
            let state = self.inner.lock_state();
            urls.iter().filter(|u| state.cache.contains_key(u.as_str())).count()
        };

        info!("Preloaded {}/{} images", loaded, urls.len());
        PreloadReport {
            requested: urls.len(),
            loaded,
        }
    }

    /// Cached image for `url`, loading it once if needed.
    ///
    /// Returns `None` when that single attempt fails.
    pub async fn get(&self, url: &str) -> Option<ImageHandle> {
        if let Some(image) = self.cached(url) {
            return Some(image);
        }

        self.preload(url).await;

        let image = self.cached(url);
        if image.is_none() {
            debug!("Image unavailable: {}", url);
        }
        image
    }

    /// Cached image for `url` without loading
    pub fn cached(&self, url: &str) -> Option<ImageHandle> {
        self.inner.lock_state().cache.get(url).cloned()
    }

    /// True when `url` is in the memory cache
    pub fn is_cached(&self, url: &str) -> bool {
        self.inner.lock_state().cache.contains_key(url)
    }

    /// Get statistics
    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock_state();
        QueueStats {
            cached: state.cache.len(),
            queued: state.pending.len(),
            loading: state.loading,
            peak_loading: state.peak_loading,
            loads_started: state.loads_started,
            loads_failed: state.loads_failed,
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start queued loads until the window is full
    fn drain(inner: &Arc<Inner>) {
        let started: Vec<String> = {
            let mut state = inner.lock_state();
            let mut started = Vec::new();

            while state.loading < inner.config.max_parallel_loads {
                let Some(url) = state.pending.pop_front() else {
                    break;
                };
                state.loading += 1;
                state.loads_started += 1;
                started.push(url);
            }
            state.peak_loading = state.peak_loading.max(state.loading);
            started
        };

        for url in started {
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                // Own task, so a panicking load still settles its slot
                let load = {
                    let inner = Arc::clone(&inner);
                    let url = url.clone();
                    tokio::spawn(async move { inner.load_image(&url).await })
                };
                let result = match load.await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!("Load of {} aborted: {}", url, e);
                        Err(LoadError::Aborted(e.to_string()))
                    }
                };
                inner.settle(&url, result);
                Inner::drain(&inner);
            });
        }
    }

    async fn load_image(&self, url: &str) -> Result<DecodedImage, LoadError> {
        let request = FetchRequest::image(url).with_mode(self.config.cross_origin.request_mode());
        let response = self.fetcher.fetch(&request).await?;

        // Image elements paint opaque responses; their bodies still have to decode
        if !response.is_success() && !response.is_opaque() {
            return Err(LoadError::Status(response.status.as_u16()));
        }

        decode::decode(url, response.body, self.config.decoding_hint).await
    }

    fn settle(&self, url: &str, result: Result<DecodedImage, LoadError>) {
        let tx = {
            let mut state = self.lock_state();
            state.loading -= 1;

            match result {
                Ok(image) => {
                    debug!("Image loaded: {} ({}x{})", url, image.width, image.height);
                    state.cache.insert(url.to_string(), Arc::new(image));
                }
                Err(e) => {
                    warn!("Failed to load: {} ({})", url, e);
                    state.loads_failed += 1;
                }
            }
            state.tasks.remove(url)
        };

        if let Some(tx) = tx {
            tx.send_replace(true);
        }
    }
}
